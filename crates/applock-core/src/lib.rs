//! Core building blocks for the application lock.
//!
//! The lock system, its persistence seam, and the password hashing protocol live
//! here so operator surfaces can focus on prompting instead of state handling.

pub mod error;
pub mod lock;
pub mod logging;
pub mod store;

pub use error::{AppLockError, AppLockResult};
pub use lock::{digest_hex, LockSystem, PersistedRecord, LOCK_STATE_KEY};
pub use store::{FileStore, MemoryStore, StateStore};
