//! Error taxonomy shared by the applock crates.

use thiserror::Error;

pub type AppLockResult<T> = Result<T, AppLockError>;

/// Failures surfaced by the lock system and its stores.
///
/// Empty-password rejection and failed verification attempts are expected
/// outcomes, not errors; they are reported as `Ok(false)` by the operations
/// that produce them.
#[derive(Debug, Error)]
pub enum AppLockError {
    /// Underlying store I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted lock record could not be parsed.
    #[error("malformed lock record: {0}")]
    MalformedRecord(String),

    /// Store failure that is not plain I/O.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The background hashing task did not complete.
    #[error("hashing task failed: {0}")]
    Hashing(String),
}
