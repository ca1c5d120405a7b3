use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use photon_types::{PhotonError, Result};

/// Cooperative cancellation checked at suspension points: between digest
/// read chunks, before thumbnail encode, and before each network call.
pub trait Cancel: Send + Sync {
    fn is_cancelled(&self) -> bool;

    /// Bail out with `PhotonError::Cancelled` if cancellation was requested.
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PhotonError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Shared cancellation flag. Cloning yields another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Cancel for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A token that can never be cancelled, for batch paths that run to completion.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl Cancel for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}
