use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("name already taken: {0}")]
    NameTaken(String),

    #[error("id was not reserved: {0}")]
    IdNotReserved(String),

    #[error(
        "no space: {requested} bytes requested, {used} of {total} bytes used"
    )]
    QuotaExceeded { requested: u64, used: u64, total: u64 },

    #[error("file exceeds the {limit} byte limit")]
    FileTooLarge { limit: u64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl ToString) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// Whether the error wraps a fault of the underlying storage rather
    /// than a refusal by the core.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Json(_)
                | Self::Redb(_)
                | Self::RedbDatabase(_)
                | Self::RedbStorage(_)
                | Self::RedbTransaction(_)
                | Self::RedbTable(_)
                | Self::RedbCommit(_)
        )
    }
}
