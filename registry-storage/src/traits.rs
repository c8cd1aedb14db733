//! The storage contract every backend (in-memory, relational, ...) must
//! satisfy identically. See `tests::conformance` for the suite every
//! implementation is expected to pass.
//!
//! Every operation is scoped to a `context` (the namespace described in
//! spec §3) which the caller has already normalized — this trait never
//! validates context names, it only partitions by them.
//!
//! # Cancellation
//!
//! Rust's async model makes an explicit cancellation-token parameter
//! unnecessary: a caller that wants to abort simply drops the future, and
//! every implementation here is written so a dropped future leaves no
//! partial state (no await point sits between a mutation and its
//! durability).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ApiKeyRecord, ConfigRecord, CreateOutcome, ImportedSchema, ListSchemasParams, ModeRecord,
    NewSchema, SchemaRecord, SubjectVersion, SubjectVersionKey, UserRecord,
};

/// Unified storage trait for the registry engine.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; the engine holds a single shared
/// `Arc<dyn RegistryStorage>` across all concurrently-handled requests.
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    // ---- schema & subject operations ----------------------------------

    /// Register `new` under `subject`. See spec §4.1 `CreateSchema` for the
    /// fingerprint-reuse and id/version allocation rules.
    async fn create_schema(
        &self,
        context: &str,
        subject: &str,
        new: NewSchema,
    ) -> Result<CreateOutcome>;

    async fn get_schema_by_id(&self, context: &str, id: i64) -> Result<SchemaRecord>;

    /// `version == -1` means "latest non-deleted version".
    async fn get_schema_by_subject_version(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        include_deleted: bool,
    ) -> Result<(SchemaRecord, SubjectVersion)>;

    async fn get_latest_schema(
        &self,
        context: &str,
        subject: &str,
    ) -> Result<(SchemaRecord, SubjectVersion)> {
        self.get_schema_by_subject_version(context, subject, -1, false)
            .await
    }

    async fn get_schemas_by_subject(
        &self,
        context: &str,
        subject: &str,
        include_deleted: bool,
    ) -> Result<Vec<(SchemaRecord, SubjectVersion)>>;

    async fn get_schema_by_fingerprint(
        &self,
        context: &str,
        subject: &str,
        fingerprint: &str,
        include_deleted: bool,
    ) -> Result<Option<(SchemaRecord, SubjectVersion)>>;

    async fn get_schema_by_global_fingerprint(
        &self,
        context: &str,
        fingerprint: &str,
    ) -> Result<Option<SchemaRecord>>;

    /// Soft-delete on first call, permanent on a second call against an
    /// already soft-deleted version. A permanent delete on a version that
    /// is not yet soft-deleted fails with `VersionNotSoftDeleted`.
    async fn delete_schema(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        permanent: bool,
    ) -> Result<()>;

    async fn list_subjects(&self, context: &str, include_deleted: bool) -> Result<Vec<String>>;

    async fn subject_exists(&self, context: &str, subject: &str) -> Result<bool>;

    /// Returns the versions that were deleted. Permanent delete requires
    /// every version to already be soft-deleted.
    async fn delete_subject(
        &self,
        context: &str,
        subject: &str,
        permanent: bool,
    ) -> Result<Vec<i32>>;

    async fn list_schemas(
        &self,
        context: &str,
        params: ListSchemasParams,
    ) -> Result<Vec<(SchemaRecord, SubjectVersion)>>;

    // ---- reference operations ------------------------------------------

    async fn get_referenced_by(
        &self,
        context: &str,
        subject: &str,
        version: i32,
    ) -> Result<Vec<SubjectVersionKey>>;

    async fn get_subjects_by_schema_id(
        &self,
        context: &str,
        id: i64,
        include_deleted: bool,
    ) -> Result<Vec<String>>;

    async fn get_versions_by_schema_id(
        &self,
        context: &str,
        id: i64,
        include_deleted: bool,
    ) -> Result<Vec<SubjectVersionKey>>;

    // ---- config & mode ---------------------------------------------------

    async fn get_config(&self, context: &str, subject: &str) -> Result<Option<ConfigRecord>>;
    async fn set_config(&self, context: &str, subject: &str, config: ConfigRecord) -> Result<()>;
    async fn delete_config(&self, context: &str, subject: &str) -> Result<()>;

    async fn get_global_config(&self, context: &str) -> Result<Option<ConfigRecord>>;
    async fn set_global_config(&self, context: &str, config: ConfigRecord) -> Result<()>;
    async fn delete_global_config(&self, context: &str) -> Result<()>;

    async fn get_mode(&self, context: &str, subject: &str) -> Result<Option<ModeRecord>>;
    async fn set_mode(&self, context: &str, subject: &str, mode: ModeRecord) -> Result<()>;
    async fn delete_mode(&self, context: &str, subject: &str) -> Result<()>;

    async fn get_global_mode(&self, context: &str) -> Result<Option<ModeRecord>>;
    async fn set_global_mode(&self, context: &str, mode: ModeRecord) -> Result<()>;
    async fn delete_global_mode(&self, context: &str) -> Result<()>;

    // ---- id management & import ------------------------------------------

    async fn next_id(&self, context: &str) -> Result<i64>;
    async fn get_max_schema_id(&self, context: &str) -> Result<i64>;
    async fn set_next_id(&self, context: &str, value: i64) -> Result<()>;

    async fn import_schema(&self, context: &str, imported: ImportedSchema) -> Result<()>;

    // ---- contexts ---------------------------------------------------------

    async fn list_contexts(&self) -> Result<Vec<String>>;

    // ---- auth (interface shape only, spec §6) ----------------------------

    async fn create_user(&self, username: &str, roles: Vec<String>) -> Result<UserRecord>;
    async fn get_user(&self, id: i64) -> Result<UserRecord>;
    async fn get_user_by_username(&self, username: &str) -> Result<UserRecord>;
    async fn delete_user(&self, id: i64) -> Result<()>;
    async fn list_users(&self) -> Result<Vec<UserRecord>>;

    async fn create_api_key(
        &self,
        user_id: i64,
        name: &str,
        key_hash: &str,
    ) -> Result<ApiKeyRecord>;
    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<ApiKeyRecord>;
    async fn delete_api_key(&self, id: i64) -> Result<()>;
    async fn update_api_key_last_used(&self, id: i64) -> Result<()>;
}
