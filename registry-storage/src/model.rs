//! Domain model persisted by the registry: subjects, schemas, versions,
//! configuration, modes and the auth records described by the storage
//! contract.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three schema formats the registry understands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    #[default]
    Avro,
    Protobuf,
    Json,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::Avro => write!(f, "AVRO"),
            SchemaType::Protobuf => write!(f, "PROTOBUF"),
            SchemaType::Json => write!(f, "JSON"),
        }
    }
}

impl FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("AVRO") => Ok(SchemaType::Avro),
            s if s.eq_ignore_ascii_case("PROTOBUF") => Ok(SchemaType::Protobuf),
            s if s.eq_ignore_ascii_case("JSON") => Ok(SchemaType::Json),
            other => Err(format!("unknown schema type: {other}")),
        }
    }
}

/// A named dependency on a type defined in another subject/version, in the
/// same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    pub subject: String,
    pub version: i32,
}

/// The stored form of one schema's content, shared by every subject/version
/// that happens to point at it (fingerprint dedup, invariant 3 of spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub id: i64,
    pub schema_type: SchemaType,
    pub schema: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<serde_json::Value>,
}

/// The binding `(subject, version) -> schema id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectVersion {
    pub subject: String,
    pub version: i32,
    pub schema_id: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Seven compatibility policies a subject (or a whole context) can enforce
/// when a new schema version is registered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    #[default]
    Backward,
    BackwardTransitive,
    Forward,
    ForwardTransitive,
    Full,
    FullTransitive,
    None,
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
            CompatibilityLevel::None => "NONE",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CompatibilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BACKWARD" => Ok(Self::Backward),
            "BACKWARD_TRANSITIVE" => Ok(Self::BackwardTransitive),
            "FORWARD" => Ok(Self::Forward),
            "FORWARD_TRANSITIVE" => Ok(Self::ForwardTransitive),
            "FULL" => Ok(Self::Full),
            "FULL_TRANSITIVE" => Ok(Self::FullTransitive),
            "NONE" => Ok(Self::None),
            other => Err(format!("unknown compatibility level: {other}")),
        }
    }
}

impl CompatibilityLevel {
    /// Whether this level requires walking every existing version rather
    /// than only the latest one.
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }
}

/// Compatibility configuration, scoped either to a whole context
/// (`subject == ""`, via [`crate::RegistryStorage::get_global_config`]) or
/// to one subject.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_level: Option<CompatibilityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_metadata: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_metadata: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule_set: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_rule_set: Option<HashMap<String, String>>,
}

/// The operational gate on a subject, or a whole context.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "READWRITE")]
    ReadWrite,
    #[serde(rename = "READONLY")]
    ReadOnly,
    #[serde(rename = "IMPORT")]
    Import,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ReadWrite => write!(f, "READWRITE"),
            Mode::ReadOnly => write!(f, "READONLY"),
            Mode::Import => write!(f, "IMPORT"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READWRITE" => Ok(Mode::ReadWrite),
            "READONLY" => Ok(Mode::ReadOnly),
            "IMPORT" => Ok(Mode::Import),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeRecord {
    pub mode: Mode,
}

/// Parameters for [`crate::RegistryStorage::list_schemas`].
#[derive(Debug, Default, Clone)]
pub struct ListSchemasParams {
    pub subject_prefix: Option<String>,
    pub deleted: bool,
    pub latest_only: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// The outcome of a natural (non-import) schema creation. `AlreadyExists`
/// is not a failure: a second registration of an identical fingerprint
/// under the same subject resolves to the binding that won the race
/// (spec §3 invariant 2, §5 concurrency note on `CreateSchema`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { id: i64, version: i32 },
    AlreadyExists { id: i64, version: i32 },
}

impl CreateOutcome {
    pub fn id(&self) -> i64 {
        match self {
            CreateOutcome::Created { id, .. } | CreateOutcome::AlreadyExists { id, .. } => *id,
        }
    }

    pub fn version(&self) -> i32 {
        match self {
            CreateOutcome::Created { version, .. }
            | CreateOutcome::AlreadyExists { version, .. } => *version,
        }
    }
}

/// A schema submitted for registration, before an id/version has been
/// assigned.
#[derive(Debug, Clone)]
pub struct NewSchema {
    pub schema_type: SchemaType,
    pub schema: String,
    pub references: Vec<Reference>,
    pub fingerprint: String,
    pub metadata: Option<serde_json::Value>,
    pub rule_set: Option<serde_json::Value>,
}

/// Caller-supplied `(id, subject, version)` triple for `ImportSchema`.
#[derive(Debug, Clone)]
pub struct ImportedSchema {
    pub id: i64,
    pub subject: String,
    pub version: i32,
    pub new: NewSchema,
}

/// Authentication identity. Scoped globally, not per-context (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// An API key bound to a [`UserRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The literal `.` context, used whenever a request does not specify one.
pub const DEFAULT_CONTEXT: &str = ".";

/// A `(subject, version)` pair, the unit referenced by [`Reference`] and
/// returned by `GetReferencedBy`/`GetVersionsBySchemaID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVersionKey {
    pub subject: String,
    pub version: i32,
}
