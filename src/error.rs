use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Offline cache install failed for {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache storage error: {0}")]
    CacheStorage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NotebookError>;

// Rendered as a plain string when handed to a frontend
impl serde::Serialize for NotebookError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
