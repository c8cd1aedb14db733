//! Storage error taxonomy (spec §4.1's sentinel list, §7's error kinds).

use thiserror::Error;

/// Storage operation errors. Every backend must map its native failures
/// onto these variants; higher layers never pattern-match on backend
/// specific strings (spec §7).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("schema not found")]
    SchemaNotFound,

    #[error("version not found: {subject}/{version}")]
    VersionNotFound { subject: String, version: i32 },

    #[error("subject is soft-deleted: {0}")]
    SubjectDeleted(String),

    #[error("subject is not soft-deleted: {0}")]
    SubjectNotSoftDeleted(String),

    #[error("version is not soft-deleted: {subject}/{version}")]
    VersionNotSoftDeleted { subject: String, version: i32 },

    #[error("schema id conflict: {id} already bound to a different fingerprint")]
    SchemaIdConflict { id: i64 },

    #[error("subject/version already exists: {subject}/{version}")]
    SubjectVersionExists { subject: String, version: i32 },

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("api key not found")]
    ApiKeyNotFound,

    #[error("api key already exists: {0}")]
    ApiKeyExists(String),

    #[error("context not found: {0}")]
    ContextNotFound(String),

    #[error("backend not supported: {0}")]
    NotSupported(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::SubjectNotFound(_)
                | StorageError::SchemaNotFound
                | StorageError::VersionNotFound { .. }
                | StorageError::UserNotFound(_)
                | StorageError::ApiKeyNotFound
                | StorageError::ContextNotFound(_)
        )
    }
}
