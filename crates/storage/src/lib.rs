pub mod error;
pub mod history;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use history::{HISTORY_CAPACITY, INPUT_HISTORY_KEY, InputHistory, Recall};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
