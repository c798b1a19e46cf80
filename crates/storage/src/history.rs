use std::collections::VecDeque;
use std::sync::Arc;

use snafu::ResultExt;

use super::error::{DecodeHistorySnafu, EncodeHistorySnafu, StorageResult};
use super::kv::{KeyValueStore, MemoryStore};

pub const INPUT_HISTORY_KEY: &str = "charla.input-history";
pub const HISTORY_CAPACITY: usize = 100;

/// Result of moving the history cursor toward newer entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recall {
    Entry(String),
    /// Navigation ended past the newest entry; the input should be cleared.
    Empty,
}

/// Bounded record of submitted inputs with a bidirectional recall cursor.
///
/// Persistence is best-effort: backend failures are logged and the history keeps working
/// in memory.
pub struct InputHistory {
    store: Arc<dyn KeyValueStore>,
    key: String,
    entries: VecDeque<String>,
    cursor: Option<usize>,
}

impl InputHistory {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_key(store, INPUT_HISTORY_KEY)
    }

    pub fn load_with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries = match read_entries(store.as_ref(), &key) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    key = %key,
                    error = %error,
                    "input history unavailable; starting empty"
                );
                VecDeque::new()
            }
        };

        Self {
            store,
            key,
            entries,
            cursor: None,
        }
    }

    /// Creates a history that is never written to disk.
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new()))
    }

    pub fn record(&mut self, text: impl Into<String>) {
        self.entries.push_back(text.into());
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.cursor = None;
        self.persist();
    }

    pub fn navigate_back(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let index = match self.cursor {
            None => self.entries.len() - 1,
            Some(index) => index.saturating_sub(1),
        };
        self.cursor = Some(index);
        self.entries.get(index).cloned()
    }

    pub fn navigate_forward(&mut self) -> Option<Recall> {
        let index = self.cursor?;

        if index + 1 >= self.entries.len() {
            self.cursor = None;
            return Some(Recall::Empty);
        }

        self.cursor = Some(index + 1);
        self.entries.get(index + 1).cloned().map(Recall::Entry)
    }

    pub fn is_navigating(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) {
        if let Err(error) = write_entries(self.store.as_ref(), &self.key, &self.entries) {
            tracing::warn!(
                key = %self.key,
                error = %error,
                "failed to persist input history; keeping it in memory"
            );
        }
    }
}

fn read_entries(store: &dyn KeyValueStore, key: &str) -> StorageResult<VecDeque<String>> {
    let Some(raw) = store.get(key)? else {
        return Ok(VecDeque::new());
    };

    let mut entries: VecDeque<String> =
        serde_json::from_str(&raw).context(DecodeHistorySnafu {
            stage: "decode-history",
            key,
        })?;

    while entries.len() > HISTORY_CAPACITY {
        entries.pop_front();
    }
    Ok(entries)
}

fn write_entries(
    store: &dyn KeyValueStore,
    key: &str,
    entries: &VecDeque<String>,
) -> StorageResult<()> {
    let raw = serde_json::to_string(entries).context(EncodeHistorySnafu {
        stage: "encode-history",
        key,
    })?;
    store.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::StorageError;
    use crate::kv::FileStore;

    struct BrokenStore {
        writes: AtomicUsize,
    }

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Unavailable {
                stage: "test-get",
                details: "quota exceeded".to_string(),
            })
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Unavailable {
                stage: "test-set",
                details: "quota exceeded".to_string(),
            })
        }
    }

    fn history_of(items: &[&str]) -> InputHistory {
        let mut history = InputHistory::in_memory();
        for item in items {
            history.record(*item);
        }
        history
    }

    #[test]
    fn back_then_forward_walks_the_entries() {
        let mut history = history_of(&["a", "b", "c"]);

        assert_eq!(history.navigate_back().as_deref(), Some("c"));
        assert_eq!(history.navigate_back().as_deref(), Some("b"));
        assert_eq!(history.navigate_back().as_deref(), Some("a"));
        assert_eq!(history.navigate_back().as_deref(), Some("a"));

        assert_eq!(
            history.navigate_forward(),
            Some(Recall::Entry("b".to_string()))
        );
        assert_eq!(
            history.navigate_forward(),
            Some(Recall::Entry("c".to_string()))
        );
        assert_eq!(history.navigate_forward(), Some(Recall::Empty));
        assert!(!history.is_navigating());
        assert_eq!(history.navigate_forward(), None);
    }

    #[test]
    fn empty_history_has_nothing_to_recall() {
        let mut history = InputHistory::in_memory();

        assert_eq!(history.navigate_back(), None);
        assert_eq!(history.navigate_forward(), None);
        assert!(!history.is_navigating());
    }

    #[test]
    fn recording_resets_the_cursor() {
        let mut history = history_of(&["a", "b"]);
        assert_eq!(history.navigate_back().as_deref(), Some("b"));
        assert_eq!(history.navigate_back().as_deref(), Some("a"));

        history.record("c");

        assert!(!history.is_navigating());
        assert_eq!(history.navigate_back().as_deref(), Some("c"));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut history = InputHistory::in_memory();
        for index in 0..=HISTORY_CAPACITY {
            history.record(format!("m{index}"));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.entries().next(), Some("m1"));
        assert_eq!(history.entries().last(), Some("m100"));
        assert!(!history.entries().any(|entry| entry == "m0"));
    }

    #[test]
    fn duplicates_are_kept_in_order() {
        let history = history_of(&["hola", "hola", "adiós", "hola"]);

        assert_eq!(
            history.entries().collect::<Vec<_>>(),
            vec!["hola", "hola", "adiós", "hola"]
        );
    }

    #[test]
    fn entries_survive_a_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut history = InputHistory::load(store.clone());
        history.record("primero");
        history.record("segundo");

        let reloaded = InputHistory::load(store.clone());

        assert_eq!(
            reloaded.entries().collect::<Vec<_>>(),
            vec!["primero", "segundo"]
        );
        assert_eq!(
            store.get(INPUT_HISTORY_KEY).unwrap().as_deref(),
            Some(r#"["primero","segundo"]"#)
        );
    }

    #[test]
    fn file_backed_history_persists_across_instances() {
        let temp = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp.path()));

        InputHistory::load(store.clone()).record("desde disco");

        let reloaded = InputHistory::load(store);
        assert_eq!(reloaded.entries().collect::<Vec<_>>(), vec!["desde disco"]);
    }

    #[test]
    fn broken_backend_degrades_to_memory() {
        let store = Arc::new(BrokenStore {
            writes: AtomicUsize::new(0),
        });
        let mut history = InputHistory::load(store.clone());

        assert!(history.is_empty());
        history.record("sigue funcionando");

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(history.navigate_back().as_deref(), Some("sigue funcionando"));
    }

    #[test]
    fn corrupt_payload_starts_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(INPUT_HISTORY_KEY, r#"{"not":"an array"}"#).unwrap();

        let history = InputHistory::load(store);

        assert!(history.is_empty());
    }

    #[test]
    fn oversized_payload_keeps_newest_entries() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let stored = (0..150).map(|index| format!("e{index}")).collect::<Vec<_>>();
        store
            .set(INPUT_HISTORY_KEY, &serde_json::to_string(&stored).unwrap())
            .unwrap();

        let history = InputHistory::load(store);

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.entries().next(), Some("e50"));
    }
}
