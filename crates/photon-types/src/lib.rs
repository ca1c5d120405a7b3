pub mod digest;
pub mod error;
pub mod format;

pub use digest::{DigestHasher, FastKey, PhotoDigest, PhotoIdentity, SHARD_COUNT};
pub use error::{PhotonError, Result};
pub use format::PhotoFormat;
