//! Lock state management: hydration, the hashing protocol, and engage/disengage.
//!
//! `LockSystem` owns the authoritative in-memory state and keeps it in step
//! with the persisted record. Plaintext passwords never reach storage; only
//! their SHA-256 digests are compared or persisted.

use crate::error::{AppLockError, AppLockResult};
use crate::store::StateStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task;
use zeroize::Zeroizing;

/// Fixed key the lock record is stored under. The name is preserved from
/// earlier releases so existing device state keeps hydrating.
pub const LOCK_STATE_KEY: &str = "mi_lock_data";

/// Durable projection of the lock state.
///
/// Field names match the historical JSON layout (`isLocked` / `password`) so
/// records exported by older builds import cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    #[serde(rename = "isLocked")]
    pub is_locked: bool,
    /// Hex-encoded password digest, `null` when no password was ever set.
    pub password: Option<String>,
}

impl PersistedRecord {
    /// Parse a serialized record.
    ///
    /// # Errors
    /// Returns `AppLockError::MalformedRecord` when `raw` is not a valid
    /// record document.
    pub fn parse(raw: &str) -> AppLockResult<Self> {
        serde_json::from_str(raw).map_err(|err| AppLockError::MalformedRecord(err.to_string()))
    }

    fn render(&self) -> AppLockResult<String> {
        serde_json::to_string(self).map_err(|err| AppLockError::Storage(err.to_string()))
    }
}

/// SHA-256 of the UTF-8 password bytes, rendered as 64 lowercase hex digits.
///
/// This is the sole mechanism for turning a plaintext password into a
/// comparable value.
pub fn digest_hex(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authoritative lock state plus the store that makes it durable.
///
/// Construct one per process and pass it to whoever needs it (navigation
/// guard, backup flows); there is no global instance. Callers are expected to
/// drive it from a single logical task at a time.
#[derive(Debug)]
pub struct LockSystem<S> {
    store: S,
    locked: bool,
    password_digest: Option<String>,
}

impl<S: StateStore> LockSystem<S> {
    /// New system in the default state: unlocked, no password set.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locked: false,
            password_digest: None,
        }
    }

    /// Whether the application is currently gated.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Digest of the active password, if one was ever set.
    pub fn password_digest(&self) -> Option<&str> {
        self.password_digest.as_deref()
    }

    /// Current state as the record that would be persisted.
    pub fn snapshot(&self) -> PersistedRecord {
        PersistedRecord {
            is_locked: self.locked,
            password: self.password_digest.clone(),
        }
    }

    /// Hydrate state from the persisted record.
    ///
    /// A missing record keeps the defaults. A record that cannot be read or
    /// parsed is logged and treated as missing; this never fails, so a corrupt
    /// device store cannot wedge startup. Storage is not rewritten here.
    pub fn initialize(&mut self) {
        let raw = match self.store.load(LOCK_STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted lock record; starting unlocked");
                return;
            }
            Err(err) => {
                warn!("failed to read lock record ({err}); starting unlocked");
                return;
            }
        };

        match PersistedRecord::parse(&raw) {
            Ok(record) => {
                info!(
                    "hydrated lock state (locked: {}, password set: {})",
                    record.is_locked,
                    record.password.is_some()
                );
                self.locked = record.is_locked;
                self.password_digest = record.password;
            }
            Err(err) => warn!("discarding corrupt lock record: {err}"),
        }
    }

    /// Engage the lock with `password`, overwriting any previously stored
    /// digest; this doubles as the change-password operation.
    ///
    /// Returns `Ok(false)` without mutating anything when the password is
    /// empty.
    ///
    /// # Errors
    /// Propagates store failures; in-memory state is only committed after the
    /// record is durable, so an `Err` leaves the previous state intact.
    pub async fn engage(&mut self, password: &str) -> AppLockResult<bool> {
        if password.is_empty() {
            return Ok(false);
        }

        let digest = hash_password(password).await?;
        self.persist(true, Some(digest.clone()))?;
        self.locked = true;
        self.password_digest = Some(digest);
        Ok(true)
    }

    /// Attempt to disengage the lock with `password`.
    ///
    /// On a digest match the lock opens and the digest is retained, so the
    /// same password can re-engage it later. A mismatch returns `Ok(false)`
    /// with no state change; wrong attempts are a normal outcome and are not
    /// logged. When no digest was ever stored the gate has nothing to verify
    /// against, so the attempt succeeds and the cleared state is persisted.
    ///
    /// # Errors
    /// Propagates store failures, leaving the previous state intact.
    pub async fn disengage(&mut self, password: &str) -> AppLockResult<bool> {
        let Some(stored) = self.password_digest.clone() else {
            self.persist(false, None)?;
            self.locked = false;
            return Ok(true);
        };

        let attempt = hash_password(password).await?;
        if attempt != stored {
            return Ok(false);
        }

        self.persist(false, Some(stored))?;
        self.locked = false;
        Ok(true)
    }

    /// Force-set both fields, bypassing verification.
    ///
    /// Escape hatch for trusted callers such as backup restore. The digest is
    /// not validated; supply a value previously produced by [`digest_hex`] or
    /// `None`.
    ///
    /// # Errors
    /// Propagates store failures, leaving the previous state intact.
    pub fn set_lock_state(&mut self, locked: bool, digest: Option<String>) -> AppLockResult<()> {
        self.persist(locked, digest.clone())?;
        self.locked = locked;
        self.password_digest = digest;
        Ok(())
    }

    // Write-before-commit: the durable record is updated first so memory and
    // disk agree whenever an operation returns Ok.
    fn persist(&mut self, locked: bool, digest: Option<String>) -> AppLockResult<()> {
        let record = PersistedRecord {
            is_locked: locked,
            password: digest,
        };
        self.store.save(LOCK_STATE_KEY, &record.render()?)
    }
}

async fn hash_password(password: &str) -> AppLockResult<String> {
    let candidate = Zeroizing::new(password.to_owned());
    task::spawn_blocking(move || digest_hex(&candidate))
        .await
        .map_err(|err| AppLockError::Hashing(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn system() -> LockSystem<MemoryStore> {
        LockSystem::new(MemoryStore::new())
    }

    #[test]
    fn digest_matches_known_vectors() {
        assert_eq!(digest_hex(""), EMPTY_SHA256);
        assert_eq!(digest_hex("abc"), ABC_SHA256);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_hex("secret"), digest_hex("secret"));
        assert_ne!(digest_hex("secret"), digest_hex("secrer"));
    }

    #[tokio::test]
    async fn engage_then_disengage_round_trips() {
        let mut system = system();
        assert!(system.engage("secret").await.unwrap());
        assert!(system.is_locked());
        assert!(system.disengage("secret").await.unwrap());
        assert!(!system.is_locked());
    }

    #[tokio::test]
    async fn wrong_password_leaves_lock_engaged() {
        let mut system = system();
        system.engage("secret").await.unwrap();
        assert!(!system.disengage("wrong").await.unwrap());
        assert!(system.is_locked());
        assert_eq!(system.password_digest(), Some(digest_hex("secret").as_str()));
    }

    #[tokio::test]
    async fn empty_password_is_rejected_without_mutation() {
        let mut system = system();
        system.engage("secret").await.unwrap();
        system.disengage("secret").await.unwrap();

        assert!(!system.engage("").await.unwrap());
        assert!(!system.is_locked());
        assert_eq!(system.password_digest(), Some(digest_hex("secret").as_str()));
    }

    #[tokio::test]
    async fn re_engage_binds_to_the_new_password_only() {
        let mut system = system();
        system.engage("a").await.unwrap();
        system.engage("b").await.unwrap();

        assert!(!system.disengage("a").await.unwrap());
        assert!(system.is_locked());
        assert!(system.disengage("b").await.unwrap());
        assert!(!system.is_locked());
    }

    #[tokio::test]
    async fn digest_survives_disengage_for_re_engage() {
        let mut system = system();
        system.engage("secret").await.unwrap();
        system.disengage("secret").await.unwrap();
        assert_eq!(system.password_digest(), Some(digest_hex("secret").as_str()));
    }

    #[tokio::test]
    async fn state_survives_restart_through_shared_store() {
        let store = MemoryStore::new();
        let mut first = LockSystem::new(store.clone());
        first.engage("secret").await.unwrap();

        let mut second = LockSystem::new(store);
        second.initialize();
        assert!(second.is_locked());
        assert_eq!(second.password_digest(), Some(digest_hex("secret").as_str()));
        assert!(second.disengage("secret").await.unwrap());
    }

    #[test]
    fn corrupt_record_falls_back_to_defaults() {
        let mut store = MemoryStore::new();
        store.save(LOCK_STATE_KEY, "not json at all").unwrap();

        let mut system = LockSystem::new(store);
        system.initialize();
        assert!(!system.is_locked());
        assert!(system.password_digest().is_none());
    }

    #[test]
    fn initialize_without_record_keeps_defaults() {
        let mut system = system();
        system.initialize();
        assert!(!system.is_locked());
        assert!(system.password_digest().is_none());
    }

    #[tokio::test]
    async fn force_set_bypasses_engage() {
        let mut system = system();
        system.set_lock_state(true, Some(digest_hex("x"))).unwrap();
        assert!(system.is_locked());
        assert!(system.disengage("x").await.unwrap());
    }

    #[tokio::test]
    async fn disengage_with_no_digest_clears_the_lock() {
        let mut system = system();
        // Inconsistent state reachable only through the force-set escape hatch.
        system.set_lock_state(true, None).unwrap();

        assert!(system.disengage("anything").await.unwrap());
        assert!(!system.is_locked());
        assert_eq!(system.snapshot(), PersistedRecord {
            is_locked: false,
            password: None,
        });
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let store = MemoryStore::new();
        let mut system = LockSystem::new(store.clone());
        system.engage("secret").await.unwrap();

        store.set_fail_writes(true);
        let err = system.engage("replacement").await.unwrap_err();
        assert!(matches!(err, AppLockError::Storage(_)));
        assert!(system.is_locked());
        assert_eq!(system.password_digest(), Some(digest_hex("secret").as_str()));

        store.set_fail_writes(false);
        assert!(system.disengage("secret").await.unwrap());
    }

    #[tokio::test]
    async fn record_round_trips_through_serialization() {
        let mut system = system();
        system.engage("secret").await.unwrap();

        let rendered = serde_json::to_string(&system.snapshot()).unwrap();
        assert!(rendered.contains("\"isLocked\":true"));
        let parsed = PersistedRecord::parse(&rendered).unwrap();
        assert_eq!(parsed, system.snapshot());
    }
}
