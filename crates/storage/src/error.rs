use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("failed to read storage entry '{key}' from {path}"))]
    ReadEntry {
        stage: &'static str,
        key: String,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write storage entry '{key}' to {path}"))]
    WriteEntry {
        stage: &'static str,
        key: String,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to create storage directory at {path}"))]
    CreateDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("stored history under '{key}' is not a JSON array of strings"))]
    DecodeHistory {
        stage: &'static str,
        key: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode history for '{key}'"))]
    EncodeHistory {
        stage: &'static str,
        key: String,
        source: serde_json::Error,
    },
    #[snafu(display("storage backend unavailable: {details}"))]
    Unavailable {
        stage: &'static str,
        details: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
