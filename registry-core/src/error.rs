//! The engine-internal error *kind* taxonomy (spec §7). The HTTP adapter
//! (`api::error::ApiError`) is the only place that maps a kind onto a
//! status code and a Confluent-style numeric error code; nothing else in
//! this crate should pattern-match on those numbers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// Not an error at the HTTP surface for registration (spec §9):
    /// callers that hit this should return the existing record, not fail.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("incompatible schema: {messages:?}")]
    Incompatible { messages: Vec<String> },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<registry_storage::StorageError> for Error {
    fn from(err: registry_storage::StorageError) -> Self {
        use registry_storage::StorageError as SE;
        match err {
            SE::SubjectNotFound(s) => Error::NotFound(format!("subject not found: {s}")),
            SE::SchemaNotFound => Error::NotFound("schema not found".to_string()),
            SE::VersionNotFound { subject, version } => {
                Error::NotFound(format!("version not found: {subject}/{version}"))
            }
            SE::SubjectDeleted(s) => Error::NotFound(format!("subject is deleted: {s}")),
            SE::SubjectNotSoftDeleted(s) => {
                Error::PreconditionFailed(format!("subject not soft-deleted: {s}"))
            }
            SE::VersionNotSoftDeleted { subject, version } => Error::PreconditionFailed(format!(
                "version not soft-deleted: {subject}/{version}"
            )),
            SE::SchemaIdConflict { id } => {
                Error::Conflict(format!("schema id conflict: {id}"))
            }
            SE::SubjectVersionExists { subject, version } => {
                Error::AlreadyExists(format!("{subject}/{version}"))
            }
            SE::UserNotFound(s) => Error::NotFound(format!("user not found: {s}")),
            SE::UserExists(s) => Error::AlreadyExists(format!("user: {s}")),
            SE::ApiKeyNotFound => Error::NotFound("api key not found".to_string()),
            SE::ApiKeyExists(s) => Error::AlreadyExists(format!("api key: {s}")),
            SE::ContextNotFound(s) => Error::NotFound(format!("context not found: {s}")),
            SE::NotSupported(s) => Error::Invalid(format!("storage backend not supported: {s}")),
            SE::Backend(s) => Error::StorageFailure(s),
        }
    }
}
