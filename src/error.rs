//! Error taxonomy shared by the schema model, row store and sync adapter.
//!
//! Model operations fail fast with one of these variants and leave the table
//! they were called on untouched. Batch operations never return them directly;
//! per-item failures are collected into a [`crate::rows::BatchReport`] instead.

use thiserror::Error;

pub type Result<T, E = TableError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    /// A referenced table, row or column id does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    /// A caller-supplied id collides with an existing one.
    #[error("{kind} id '{id}' is already in use")]
    Conflict { kind: EntityKind, id: String },
    /// Malformed input such as a bad reorder permutation or an empty name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The backing store could not be reached or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Table,
    Row,
    Column,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EntityKind::Table => "table",
            EntityKind::Row => "row",
            EntityKind::Column => "column",
        };
        f.write_str(label)
    }
}

impl TableError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        TableError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<String>) -> Self {
        TableError::Conflict {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TableError::InvalidArgument(message.into())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        TableError::StorageUnavailable(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TableError::NotFound { .. })
    }

    /// Only storage outages are worth retrying; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TableError::StorageUnavailable(_))
    }
}

impl From<std::io::Error> for TableError {
    fn from(err: std::io::Error) -> Self {
        TableError::storage(err)
    }
}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        TableError::storage(format!("encoding error: {err}"))
    }
}
