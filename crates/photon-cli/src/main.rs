mod cli;
mod cmd;

use clap::Parser;

use photon_core::config;
use photon_core::session::Session;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let Some(config_path) = config::resolve_config_path(cli.config.as_deref()) else {
        eprintln!("Error: no configuration file found.");
        eprintln!("Create ./photon.yaml or set PHOTON_CONFIG.");
        std::process::exit(1);
    };

    let engine_config = match config::load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("using config: {}", config_path.display());

    let session = match Session::open(engine_config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Scan { path } => cmd::scan::run(&session, path.as_deref()),
        Commands::Backup { path } => cmd::backup::run(&session, path.as_deref()),
        Commands::Sync => cmd::sync::run(&session),
        Commands::Status => cmd::status::run(&session),
        Commands::Retry { key } => cmd::retry::run(&session, key.as_deref()),
        Commands::Rm { digest } => cmd::rm::run(&session, &digest),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
