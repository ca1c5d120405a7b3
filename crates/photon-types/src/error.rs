use thiserror::Error;

pub type Result<T> = std::result::Result<T, PhotonError>;

#[derive(Debug, Error)]
pub enum PhotonError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: storage credentials rejected or expired")]
    Unauthorized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable image data: {0}")]
    Decode(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl PhotonError {
    /// Whether a later retry of the same operation could plausibly succeed.
    /// Network failures are transient; everything else needs intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, PhotonError::Network(_))
    }

    /// Clone-equivalent for sharing a failure with multiple waiters.
    /// `std::io::Error` is not `Clone`, so the I/O variant is rebuilt from
    /// its kind and message.
    pub fn duplicate(&self) -> PhotonError {
        match self {
            PhotonError::NotFound(s) => PhotonError::NotFound(s.clone()),
            PhotonError::Unauthorized => PhotonError::Unauthorized,
            PhotonError::Io(e) => {
                PhotonError::Io(std::io::Error::new(e.kind(), e.to_string()))
            }
            PhotonError::Decode(s) => PhotonError::Decode(s.clone()),
            PhotonError::Network(s) => PhotonError::Network(s.clone()),
            PhotonError::Integrity(s) => PhotonError::Integrity(s.clone()),
            PhotonError::InvalidFormat(s) => PhotonError::InvalidFormat(s.clone()),
            PhotonError::Config(s) => PhotonError::Config(s.clone()),
            PhotonError::Cancelled => PhotonError::Cancelled,
            PhotonError::Other(s) => PhotonError::Other(s.clone()),
        }
    }
}
