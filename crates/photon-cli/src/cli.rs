use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "photon",
    version,
    about = "Content-addressed photo backup and sync",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $PHOTON_CONFIG              (environment variable)
  3. ./photon.yaml               (project)
  4. Platform user config dir + /photon/config.yaml (e.g. ~/.config)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides PHOTON_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Scan the photo library and queue new photos for backup
    Scan {
        /// Library root (overrides `library_root` from the config)
        path: Option<String>,
    },

    /// Scan, then upload everything queued
    Backup {
        /// Library root (overrides `library_root` from the config)
        path: Option<String>,
    },

    /// Pull the latest remote catalog
    Sync,

    /// Show backup state counts and failed items
    Status,

    /// Re-queue failed items
    Retry {
        /// A specific photo key; all failed items when omitted
        key: Option<String>,
    },

    /// Remove a photo from the catalog and delete its cloud objects
    Rm {
        /// Full content digest (32 hex chars)
        digest: String,
    },
}
