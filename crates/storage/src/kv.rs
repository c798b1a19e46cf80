use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use snafu::ResultExt;

use super::error::{CreateDirectorySnafu, ReadEntrySnafu, StorageResult, WriteEntrySnafu};

const DEFAULT_DATA_DIR_NAME: &str = "charla";

/// String key-value persistence consumed by the widget core.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`; the directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<platform data dir>/charla`, or `.charla` in the working directory when the platform
    /// has no data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join(DEFAULT_DATA_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{DEFAULT_DATA_DIR_NAME}")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        let file_name = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.root.join(format!("{file_name}.json"))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        std::fs::read_to_string(&path)
            .map(Some)
            .context(ReadEntrySnafu {
                stage: "read-entry",
                key,
                path: display_path(&path),
            })
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        std::fs::create_dir_all(&self.root).context(CreateDirectorySnafu {
            stage: "create-store-directory",
            path: display_path(&self.root),
        })?;

        let path = self.entry_path(key);
        let staging = path.with_extension("json.tmp");

        // Entries are replaced atomically through a staging file.
        std::fs::write(&staging, value).context(WriteEntrySnafu {
            stage: "write-staging-entry",
            key,
            path: display_path(&staging),
        })?;
        std::fs::rename(&staging, &path).context(WriteEntrySnafu {
            stage: "commit-entry",
            key,
            path: display_path(&path),
        })
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_values() {
        let store = MemoryStore::new();

        assert_eq!(store.get("missing").unwrap(), None);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn file_store_creates_directory_on_first_write() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp.path().join("nested").join("widget"));

        assert_eq!(store.get("charla.input-history").unwrap(), None);
        store.set("charla.input-history", r#"["a"]"#).unwrap();

        assert_eq!(
            store.get("charla.input-history").unwrap().as_deref(),
            Some(r#"["a"]"#)
        );
        assert!(store.entry_path("charla.input-history").exists());
        assert!(!store.entry_path("charla.input-history").with_extension("json.tmp").exists());
    }

    #[test]
    fn file_names_are_sanitized() {
        let store = FileStore::new("/tmp/charla");

        assert_eq!(
            store.entry_path("tenant/a b:c"),
            PathBuf::from("/tmp/charla/tenant_a_b_c.json")
        );
    }

    #[test]
    fn unreadable_root_surfaces_write_error() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = FileStore::new(&blocker);

        assert!(store.set("k", "v").is_err());
    }
}
