use std::fmt;
use std::time::Duration;

use crate::RetryConfig;

/// What went wrong while moving bytes to or from the object store.
///
/// Remote backends classify their failures into this type so the retry
/// loop can decide without knowing about `PhotonError`; the mapping into
/// the application taxonomy happens at each backend's boundary.
pub enum TransferError {
    /// Request-level failure (boxed: `ureq::Error` is large).
    Http(Box<ureq::Error>),
    /// The request succeeded but reading the body did not.
    Read(std::io::Error),
    /// Malformed response or misuse; retrying cannot help.
    Fatal(String),
}

impl TransferError {
    pub fn http(e: ureq::Error) -> Self {
        TransferError::Http(Box::new(e))
    }

    /// The HTTP status code, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::Http(e) => match e.as_ref() {
                ureq::Error::Status(code, _) => Some(*code),
                ureq::Error::Transport(_) => None,
            },
            _ => None,
        }
    }

    /// Whether waiting and re-issuing the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Http(e) => match e.as_ref() {
                ureq::Error::Transport(_) => true,
                // Throttling and server-side errors clear up; 4xx does not.
                ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
            },
            TransferError::Read(e) => io_error_is_transient(e),
            TransferError::Fatal(_) => false,
        }
    }
}

fn io_error_is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        err.kind(),
        ConnectionReset | ConnectionAborted | BrokenPipe | UnexpectedEof | TimedOut | Interrupted
    )
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Http(e) => write!(f, "{e}"),
            TransferError::Read(e) => write!(f, "body read error: {e}"),
            TransferError::Fatal(msg) => f.write_str(msg),
        }
    }
}

/// Exponential backoff with jitter: attempt 0 runs immediately, attempt n
/// waits `delay * 2^(n-1)` plus up to the same again, capped.
fn pause_before(attempt: u32, config: &RetryConfig) {
    let base = config
        .retry_delay_ms
        .saturating_mul(1u64 << (attempt - 1).min(16))
        .min(config.retry_max_delay_ms);
    let jitter = rand::random::<u64>() % base.max(1);
    std::thread::sleep(Duration::from_millis(base + jitter));
}

/// Run `op` until it succeeds, fails permanently, or exhausts
/// `max_retries` additional attempts on transient errors.
pub fn with_backoff<T>(
    config: &RetryConfig,
    what: &str,
    op: impl Fn() -> std::result::Result<T, TransferError>,
) -> std::result::Result<T, TransferError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "{what}: transient failure, retry {attempt}/{}: {e}",
                    config.max_retries
                );
                pause_before(attempt, config);
            }
            Err(e) => return Err(e),
        }
    }
}
