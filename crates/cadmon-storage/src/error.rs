/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use cadmon_storage::error::StorageError;
///
/// let err = StorageError::InvalidColumnValue {
///     column: "state",
///     value: "BROKEN".to_string(),
/// };
/// assert!(err.to_string().contains("state"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while preparing the data directory.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A column held a value the domain types cannot parse.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidColumnValue {
        column: &'static str,
        value: String,
    },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
