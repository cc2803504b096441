//! Temporary storage for saved diagrams.
//!
//! Every [`FileStore`] owns a private directory under the configured temp
//! root. Entries expire after a fixed TTL and are purged lazily on each
//! access. The directory is removed when the store is disposed or dropped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default lifetime of a stored file.
pub const DEFAULT_FILE_TTL: Duration = Duration::from_secs(60 * 60);

/// Errors raised by the file store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("file store I/O failed at {path}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The requested filename is not a plain file name.
    #[error("invalid filename '{name}': must be a plain file name")]
    InvalidFilename {
        /// The rejected name.
        name: String,
    },

    /// No entry with this id exists.
    #[error("file not found: {id}")]
    NotFound {
        /// The requested id.
        id: String,
    },

    /// The entry existed but its TTL has elapsed.
    #[error("file expired: {id}")]
    Expired {
        /// The requested id.
        id: String,
    },
}

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Opaque id handed back to clients.
    pub file_id: String,
    /// Name the file was saved under.
    pub filename: String,
    /// Absolute location on disk.
    pub path: PathBuf,
    /// When the file was written.
    pub created_at: DateTime<Utc>,
    /// When the file stops being served.
    pub expires_at: DateTime<Utc>,
}

/// A TTL-bounded store of diagram files.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    ttl: chrono::Duration,
    entries: IndexMap<String, StoredFile>,
    disposed: bool,
}

impl FileStore {
    /// Creates a store in a fresh directory under `base`, or under the
    /// system temp directory when `base` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn new(base: Option<&Path>, ttl: Duration) -> Result<Self, StoreError> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let root = base.join(format!("diagram-fixture-{}", Uuid::new_v4().simple()));

        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        debug!(root = %root.display(), "Created file store");

        Ok(Self {
            root,
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            entries: IndexMap::new(),
            disposed: false,
        })
    }

    /// Returns the directory files are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of live entries (expired entries may still be counted until
    /// the next purge).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes `contents` and returns the new entry.
    ///
    /// `filename` defaults to `diagram.drawio`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilename`] for names containing path
    /// components, and [`StoreError::Io`] if the write fails.
    pub fn save(&mut self, contents: &str, filename: Option<&str>) -> Result<StoredFile, StoreError> {
        self.purge_expired();

        let filename = filename.unwrap_or("diagram.drawio").trim();
        validate_filename(filename)?;

        let file_id = Uuid::new_v4().to_string();
        let path = self.root.join(format!("{file_id}-{filename}"));
        std::fs::write(&path, contents).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let created_at = Utc::now();
        let entry = StoredFile {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            path,
            created_at,
            expires_at: created_at + self.ttl,
        };
        debug!(file_id = %file_id, path = %entry.path.display(), "Stored file");
        self.entries.insert(file_id, entry.clone());
        Ok(entry)
    }

    /// Looks up a live entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::Expired`] for entries past their TTL.
    pub fn get(&mut self, file_id: &str) -> Result<&StoredFile, StoreError> {
        let now = Utc::now();
        let expired = match self.entries.get(file_id) {
            None => {
                return Err(StoreError::NotFound {
                    id: file_id.to_string(),
                })
            }
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            self.remove(file_id);
            return Err(StoreError::Expired {
                id: file_id.to_string(),
            });
        }

        self.entries
            .get(file_id)
            .ok_or_else(|| StoreError::NotFound {
                id: file_id.to_string(),
            })
    }

    /// Removes every entry whose TTL has elapsed. Returns how many went.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Removes every entry that expired at or before `now`.
    pub fn purge_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.file_id.clone())
            .collect();

        for id in &expired {
            self.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired files");
        }
        expired.len()
    }

    /// Deletes every stored file and the store directory.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.entries.clear();
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(root = %self.root.display(), error = %e, "Failed to remove file store");
            }
        }
    }

    fn remove(&mut self, file_id: &str) {
        if let Some(entry) = self.entries.shift_remove(file_id) {
            if let Err(e) = std::fs::remove_file(&entry.path) {
                warn!(path = %entry.path.display(), error = %e, "Failed to delete stored file");
            }
        }
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn validate_filename(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.chars().any(char::is_control);

    if invalid {
        return Err(StoreError::InvalidFilename {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(Some(dir.path()), ttl).unwrap();
        (dir, store)
    }

    #[test]
    fn save_then_get() {
        let (_dir, mut store) = store(DEFAULT_FILE_TTL);
        let saved = store.save("<mxfile/>", Some("flow.drawio")).unwrap();

        assert!(saved.path.starts_with(store.root()));
        assert_eq!(std::fs::read_to_string(&saved.path).unwrap(), "<mxfile/>");
        assert!(saved.expires_at > saved.created_at);

        let fetched = store.get(&saved.file_id).unwrap();
        assert_eq!(fetched.filename, "flow.drawio");
    }

    #[test]
    fn rejects_path_components() {
        let (_dir, mut store) = store(DEFAULT_FILE_TTL);
        for name in ["../escape.xml", "a/b.xml", "..", ""] {
            assert!(
                matches!(
                    store.save("<x/>", Some(name)),
                    Err(StoreError::InvalidFilename { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (_dir, mut store) = store(DEFAULT_FILE_TTL);
        assert!(matches!(
            store.get("missing"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let (_dir, mut store) = store(Duration::ZERO);
        let saved = store.save("<x/>", None).unwrap();

        assert!(matches!(
            store.get(&saved.file_id),
            Err(StoreError::Expired { .. })
        ));
        assert!(!saved.path.exists());
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let (_dir, mut store) = store(Duration::from_secs(60));
        let first = store.save("<a/>", None).unwrap();
        store.save("<b/>", None).unwrap();

        assert_eq!(store.purge_expired(), 0);
        let later = first.expires_at + chrono::Duration::seconds(1);
        assert_eq!(store.purge_expired_at(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn dispose_removes_directory() {
        let (_dir, mut store) = store(DEFAULT_FILE_TTL);
        store.save("<x/>", None).unwrap();
        let root = store.root().to_path_buf();

        store.dispose();
        store.dispose();
        assert!(!root.exists());
    }
}
