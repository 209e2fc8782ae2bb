//! Key-value persistence seam used by the lock system.
//!
//! `FileStore` keeps one JSON document per key on disk and is the production
//! backend; `MemoryStore` backs tests and embedded callers that manage their
//! own durability.

use crate::error::{AppLockError, AppLockResult};
use directories_next::ProjectDirs;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Environment variable overriding the default state directory.
pub const STATE_DIR_ENV: &str = "APPLOCK_STATE_DIR";

const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "Applock";
const APP_NAME: &str = "applock";

/// Durable key-value store holding serialized lock records.
pub trait StateStore {
    /// Fetch the value stored under `key`, or `None` when the key was never
    /// written.
    fn load(&self, key: &str) -> AppLockResult<Option<String>>;

    /// Persist `value` under `key`, replacing any previous value. The value
    /// must be durable before this returns `Ok`.
    fn save(&mut self, key: &str, value: &str) -> AppLockResult<()>;
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

/// File-backed store writing one `<key>.json` document per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the platform state directory, honouring `APPLOCK_STATE_DIR`.
    ///
    /// # Errors
    /// Returns `AppLockError::Storage` when no platform data directory can be
    /// determined and no override is set.
    pub fn open_default() -> AppLockResult<Self> {
        if let Some(dir) = env::var_os(STATE_DIR_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::at(PathBuf::from(dir)));
        }
        let dirs = project_dirs().ok_or_else(|| {
            AppLockError::Storage(
                "unable to determine a state directory for this platform".to_string(),
            )
        })?;
        Ok(Self::at(dirs.data_dir()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl StateStore for FileStore {
    fn load(&self, key: &str) -> AppLockResult<Option<String>> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppLockError::Io(err)),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> AppLockResult<()> {
        fs::create_dir_all(&self.root)?;

        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.as_file_mut().write_all(value.as_bytes())?;
        temp.as_file_mut().flush()?;
        #[cfg(unix)]
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600))?;
        let _ = temp.as_file().sync_all();
        temp.persist(self.entry_path(key))
            .map_err(|err| AppLockError::Io(err.error))?;
        Ok(())
    }
}

/// In-memory store shared across clones, so tests can hand the "device" to a
/// fresh lock system and simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `save` calls fail, for exercising write-failure paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> AppLockResult<Option<String>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> AppLockResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppLockError::Storage("write failure injected".to_string()));
        }
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn poisoned<T>(_: T) -> AppLockError {
    AppLockError::Storage("memory store mutex poisoned".to_string())
}
