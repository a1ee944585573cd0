//! Key/value persistence for the session record.
//!
//! The session lives under a single key. `MemoryStorage` is used by embedders that
//! keep the session for the process lifetime only; `FileStorage` keeps one file per
//! key so the CLI can reuse a session across invocations.

use crate::errors::Error;
use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};
use tracing::{debug, warn};

pub trait AuthStorage: Send + Sync + Debug {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    /// Returns `Error::Storage` if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl AuthStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!("Failed to read {}: {}", path.display(), err);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::Storage(format!("Failed to create {}: {err}", self.dir.display()))
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        write_private(&tmp, value)
            .map_err(|err| Error::Storage(format!("Failed to write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|err| Error::Storage(format!("Failed to write {}: {err}", path.display())))?;

        debug!("persisted {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove {}: {}", path.display(), err),
        }
    }
}

// Session files hold bearer tokens; keep them owner-only.
#[cfg(unix)]
fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trip() -> Result<(), Error> {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("auth"), None);

        storage.set("auth", "{}")?;
        assert_eq!(storage.get("auth").as_deref(), Some("{}"));

        storage.remove("auth");
        assert_eq!(storage.get("auth"), None);
        Ok(())
    }

    #[test]
    fn file_storage_persists_across_instances() -> Result<(), Error> {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStorage::new(dir.path().join("session"));
        first.set("auth", r#"{"tokenType":"Bearer"}"#)?;

        let second = FileStorage::new(dir.path().join("session"));
        assert_eq!(
            second.get("auth").as_deref(),
            Some(r#"{"tokenType":"Bearer"}"#)
        );

        second.remove("auth");
        assert_eq!(first.get("auth"), None);
        // Removing twice is not an error.
        second.remove("auth");
        Ok(())
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let storage = FileStorage::new("/var/lib/tripkey");
        assert_eq!(
            storage.path_for("../auth"),
            PathBuf::from("/var/lib/tripkey/___auth.json")
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_writes_owner_only_files() -> Result<(), Error> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.set("auth", "{}")?;

        let mode = fs::metadata(dir.path().join("auth.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }
}
