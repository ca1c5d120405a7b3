pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod events;
pub mod identity;
pub mod queue;
pub mod scoped;
pub mod session;
pub mod source;
pub mod sync;
pub mod thumb;

pub use photon_types::{PhotonError, Result};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
