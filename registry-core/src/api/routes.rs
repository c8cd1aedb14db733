//! HTTP handlers for the REST surface (spec §6.1), following the
//! teacher's `api/routes.rs` style: `Path`/`Query`/`State` extractors,
//! `tracing::instrument` on the hot paths, `metrics::counter!`/
//! `histogram!` recording outcome and latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use registry_storage::model::{
    ConfigRecord, ListSchemasParams, Mode, ModeRecord, Reference, SchemaType, SubjectVersionKey,
};

use crate::context;
use crate::engine::{ImportItem, Registry, SchemaRequest, VersionSelector};

use super::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

fn ctx(params: &HashMap<String, String>) -> Result<String, ApiError> {
    let raw = params.get("context").map(String::as_str).unwrap_or(".");
    context::normalize(raw).map_err(ApiError::from)
}

fn subject(params: &HashMap<String, String>) -> Result<String, ApiError> {
    params
        .get("subject")
        .cloned()
        .ok_or_else(|| ApiError::from(crate::Error::Invalid("missing subject".to_string())))
}

fn parse_version(params: &HashMap<String, String>) -> Result<i32, ApiError> {
    let raw = params
        .get("version")
        .ok_or_else(|| ApiError::from(crate::Error::Invalid("missing version".to_string())))?;
    if raw == "latest" {
        return Ok(-1);
    }
    raw.parse()
        .map_err(|_| ApiError::from(crate::Error::Invalid(format!("invalid version: {raw}"))))
}

#[derive(Debug, Deserialize)]
pub struct ReferenceDto {
    pub name: String,
    pub subject: String,
    pub version: i32,
}

impl From<ReferenceDto> for Reference {
    fn from(r: ReferenceDto) -> Self {
        Reference {
            name: r.name,
            subject: r.subject,
            version: r.version,
        }
    }
}

fn reference_to_dto(r: &Reference) -> ReferenceDto {
    ReferenceDto {
        name: r.name.clone(),
        subject: r.subject.clone(),
        version: r.version,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRequestBody {
    #[serde(default, rename = "schemaType")]
    pub schema_type: Option<String>,
    pub schema: String,
    #[serde(default)]
    pub references: Vec<ReferenceDto>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, rename = "ruleSet")]
    pub rule_set: Option<serde_json::Value>,
}

impl SchemaRequestBody {
    fn into_request(self) -> Result<SchemaRequest, ApiError> {
        let schema_type = match self.schema_type {
            Some(s) => Some(
                s.parse::<SchemaType>()
                    .map_err(|e| ApiError::from(crate::Error::Invalid(e)))?,
            ),
            None => None,
        };
        Ok(SchemaRequest {
            schema_type,
            schema: self.schema,
            references: self.references.into_iter().map(Into::into).collect(),
            metadata: self.metadata,
            rule_set: self.rule_set,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResponse {
    pub subject: String,
    pub id: i64,
    pub version: i32,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaByIdResponse {
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_identity: Option<String>,
}

/// GET `/` and the `/health/{live,ready,startup}` probes.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn schema_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .registry
            .supported_schema_types()
            .into_iter()
            .map(|t| t.to_string())
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct ListSchemasQuery {
    #[serde(default, rename = "subjectPrefix")]
    pub subject_prefix: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, rename = "latestOnly")]
    pub latest_only: bool,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_schemas(
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<ListSchemasQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SchemaResponse>>, ApiError> {
    let context = ctx(&params)?;
    let rows = state
        .registry
        .list_schemas(
            &context,
            ListSchemasParams {
                subject_prefix: query.subject_prefix,
                deleted: query.deleted,
                latest_only: query.latest_only,
                offset: query.offset,
                limit: query.limit,
            },
        )
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(record, version)| SchemaResponse {
                subject: version.subject,
                id: record.id,
                version: version.version,
                schema: record.schema,
                schema_type: Some(record.schema_type.to_string()),
                references: record.references.iter().map(reference_to_dto).collect(),
            })
            .collect(),
    ))
}

#[tracing::instrument(name = "get_schema_by_id", skip(params, state))]
pub async fn get_schema_by_id(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<SchemaByIdResponse>, ApiError> {
    let context = ctx(&params)?;
    let id = parse_id(&params)?;
    let record = state.registry.get_schema_by_id(&context, id).await?;
    let identity = state.registry.schema_identity(&context, &record).await.ok().flatten();
    Ok(Json(SchemaByIdResponse {
        schema: record.schema,
        schema_type: Some(record.schema_type.to_string()),
        references: record.references.iter().map(reference_to_dto).collect(),
        schema_identity: identity,
    }))
}

pub async fn get_schema_text_by_id(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<String, ApiError> {
    let context = ctx(&params)?;
    let id = parse_id(&params)?;
    Ok(state.registry.get_schema_by_id(&context, id).await?.schema)
}

fn parse_id(params: &HashMap<String, String>) -> Result<i64, ApiError> {
    params
        .get("id")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::from(crate::Error::Invalid("invalid schema id".to_string())))
}

pub async fn get_subjects_by_id(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let context = ctx(&params)?;
    let id = parse_id(&params)?;
    Ok(Json(state.registry.get_subjects_by_schema_id(&context, id).await?))
}

pub async fn get_versions_by_id(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectVersionKey>>, ApiError> {
    let context = ctx(&params)?;
    let id = parse_id(&params)?;
    Ok(Json(state.registry.get_versions_by_schema_id(&context, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListSubjectsQuery {
    #[serde(default)]
    pub deleted: bool,
}

pub async fn list_subjects(
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<ListSubjectsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let context = ctx(&params)?;
    Ok(Json(state.registry.list_subjects(&context, query.deleted).await?))
}

#[tracing::instrument(name = "register_schema", skip(state, body), fields(subject = %subject(&params).unwrap_or_default()))]
pub async fn register_schema(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<SchemaRequestBody>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let start = Instant::now();
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let request = body.into_request()?;

    let result = state.registry.register_schema(&context, &subject, request).await;
    let duration = start.elapsed().as_secs_f64();

    match result {
        Ok((id, _version)) => {
            metrics::histogram!("registry_register_duration_seconds", "status" => "ok").record(duration);
            metrics::counter!("registry_register_total", "status" => "ok").increment(1);
            Ok((StatusCode::OK, Json(RegisterResponse { id })))
        }
        Err(e) => {
            metrics::counter!("registry_register_total", "status" => "error").increment(1);
            Err(ApiError::from(e))
        }
    }
}

pub async fn lookup_schema(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<SchemaRequestBody>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let request = body.into_request()?;
    let (id, version) = state
        .registry
        .lookup_schema(&context, &subject, request, false)
        .await?;
    let (record, subject_version) = state.registry.get_version(&context, &subject, version, false).await?;
    Ok(Json(SchemaResponse {
        subject: subject_version.subject,
        id,
        version,
        schema: record.schema,
        schema_type: Some(record.schema_type.to_string()),
        references: record.references.iter().map(reference_to_dto).collect(),
    }))
}

pub async fn list_versions(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Vec<i32>>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    Ok(Json(state.registry.get_versions(&context, &subject, false).await?))
}

pub async fn get_version(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let version = parse_version(&params)?;
    let (record, subject_version) = state.registry.get_version(&context, &subject, version, false).await?;
    Ok(Json(SchemaResponse {
        subject: subject_version.subject,
        id: record.id,
        version: subject_version.version,
        schema: record.schema,
        schema_type: Some(record.schema_type.to_string()),
        references: record.references.iter().map(reference_to_dto).collect(),
    }))
}

pub async fn get_version_schema_text(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<String, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let version = parse_version(&params)?;
    let (record, _) = state.registry.get_version(&context, &subject, version, false).await?;
    Ok(record.schema)
}

pub async fn get_referenced_by(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectVersionKey>>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let version = parse_version(&params)?;
    Ok(Json(state.registry.get_referenced_by(&context, &subject, version).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub permanent: bool,
}

pub async fn delete_subject(
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<DeleteQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<i32>>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    Ok(Json(
        state.registry.delete_subject(&context, &subject, query.permanent).await?,
    ))
}

pub async fn delete_version(
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<DeleteQuery>,
    State(state): State<AppState>,
) -> Result<Json<i32>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let version = parse_version(&params)?;
    state
        .registry
        .delete_version(&context, &subject, version, query.permanent)
        .await?;
    Ok(Json(version))
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_group: Option<String>,
    /// Opaque pass-through fields (SPEC_FULL §3): stored and echoed back
    /// verbatim, never interpreted by this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rule_set: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_rule_set: Option<HashMap<String, String>>,
}

impl ConfigDto {
    fn into_record(self) -> Result<ConfigRecord, ApiError> {
        let compatibility_level = match self.compatibility {
            Some(s) => Some(
                s.parse()
                    .map_err(|e| ApiError::from(crate::Error::Invalid(e)))?,
            ),
            None => None,
        };
        Ok(ConfigRecord {
            compatibility_level,
            normalize: self.normalize,
            compatibility_group: self.compatibility_group,
            default_metadata: self.default_metadata,
            override_metadata: self.override_metadata,
            default_rule_set: self.default_rule_set,
            override_rule_set: self.override_rule_set,
        })
    }

    fn from_record(record: ConfigRecord) -> Self {
        Self {
            compatibility: record.compatibility_level.map(|l| l.to_string()),
            normalize: record.normalize,
            compatibility_group: record.compatibility_group,
            default_metadata: record.default_metadata,
            override_metadata: record.override_metadata,
            default_rule_set: record.default_rule_set,
            override_rule_set: record.override_rule_set,
        }
    }
}

pub async fn get_global_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<ConfigDto>, ApiError> {
    let context = ctx(&params)?;
    let config = state.registry.get_global_config(&context).await?.unwrap_or_default();
    Ok(Json(ConfigDto::from_record(config)))
}

pub async fn set_global_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<ConfigDto>,
) -> Result<Json<ConfigDto>, ApiError> {
    let context = ctx(&params)?;
    let record = body.into_record()?;
    state.registry.set_global_config(&context, record.clone()).await?;
    Ok(Json(ConfigDto::from_record(record)))
}

pub async fn delete_global_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let context = ctx(&params)?;
    state.registry.delete_config(&context, "").await?;
    Ok(StatusCode::OK)
}

pub async fn get_subject_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<ConfigDto>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let config = state.registry.get_config(&context, &subject).await?.unwrap_or_default();
    Ok(Json(ConfigDto::from_record(config)))
}

pub async fn set_subject_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<ConfigDto>,
) -> Result<Json<ConfigDto>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let record = body.into_record()?;
    state.registry.set_config(&context, &subject, record.clone()).await?;
    Ok(Json(ConfigDto::from_record(record)))
}

pub async fn delete_subject_config(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    state.registry.delete_config(&context, &subject).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeDto {
    pub mode: String,
}

impl ModeDto {
    fn into_record(self) -> Result<ModeRecord, ApiError> {
        Ok(ModeRecord {
            mode: self.mode.parse::<Mode>().map_err(|e| ApiError::from(crate::Error::Invalid(e)))?,
        })
    }

    fn from_record(record: ModeRecord) -> Self {
        Self {
            mode: record.mode.to_string(),
        }
    }
}

pub async fn get_global_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<ModeDto>, ApiError> {
    let context = ctx(&params)?;
    let mode = state
        .registry
        .get_global_mode(&context)
        .await?
        .unwrap_or(ModeRecord { mode: Mode::ReadWrite });
    Ok(Json(ModeDto::from_record(mode)))
}

pub async fn set_global_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<ModeDto>,
) -> Result<Json<ModeDto>, ApiError> {
    let context = ctx(&params)?;
    let record = body.into_record()?;
    state.registry.set_global_mode(&context, record).await?;
    Ok(Json(ModeDto::from_record(record)))
}

pub async fn get_subject_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<ModeDto>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let mode = state
        .registry
        .get_mode(&context, &subject)
        .await?
        .unwrap_or(ModeRecord { mode: Mode::ReadWrite });
    Ok(Json(ModeDto::from_record(mode)))
}

pub async fn set_subject_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<ModeDto>,
) -> Result<Json<ModeDto>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let record = body.into_record()?;
    state.registry.set_mode(&context, &subject, record).await?;
    Ok(Json(ModeDto::from_record(record)))
}

pub async fn delete_global_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let context = ctx(&params)?;
    state.registry.delete_global_mode(&context).await?;
    Ok(StatusCode::OK)
}

pub async fn delete_subject_mode(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    state.registry.delete_mode(&context, &subject).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResponse {
    pub is_compatible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

pub async fn check_compatibility_version(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<SchemaRequestBody>,
) -> Result<Json<CompatibilityResponse>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let version = parse_version(&params)?;
    let request = body.into_request()?;
    let selector = if version == -1 {
        VersionSelector::Latest
    } else {
        VersionSelector::Version(version)
    };
    let report = state
        .registry
        .check_compatibility(&context, &subject, selector, request)
        .await?;
    Ok(Json(CompatibilityResponse {
        is_compatible: report.is_compatible,
        messages: report.messages,
    }))
}

pub async fn check_compatibility_all(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(body): Json<SchemaRequestBody>,
) -> Result<Json<CompatibilityResponse>, ApiError> {
    let context = ctx(&params)?;
    let subject = subject(&params)?;
    let request = body.into_request()?;
    let report = state
        .registry
        .check_compatibility(&context, &subject, VersionSelector::All, request)
        .await?;
    Ok(Json(CompatibilityResponse {
        is_compatible: report.is_compatible,
        messages: report.messages,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportItemBody {
    pub id: i64,
    pub subject: String,
    pub version: i32,
    #[serde(flatten)]
    pub request: SchemaRequestBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResultEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub errors: usize,
    pub results: Vec<ImportResultEntry>,
}

pub async fn import_schemas(
    Path(params): Path<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(items): Json<Vec<ImportItemBody>>,
) -> Result<Json<ImportResponse>, ApiError> {
    let context = ctx(&params)?;
    let mut engine_items = Vec::with_capacity(items.len());
    for item in items {
        let request = item.request.into_request()?;
        engine_items.push(ImportItem {
            id: item.id,
            subject: item.subject,
            version: item.version,
            request,
        });
    }

    let outcome = state.registry.import_schemas(&context, engine_items).await?;
    let mut by_index: HashMap<usize, String> = outcome.errors.into_iter().collect();

    let results = outcome
        .results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some((id, version)) => ImportResultEntry {
                index,
                id: Some(id),
                version: Some(version),
                error: None,
            },
            None => ImportResultEntry {
                index,
                id: None,
                version: None,
                error: by_index.remove(&index),
            },
        })
        .collect::<Vec<_>>();

    Ok(Json(ImportResponse {
        imported: outcome.imported,
        errors: results.iter().filter(|r| r.error.is_some()).count(),
        results,
    }))
}

pub async fn list_contexts(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.registry.get_contexts().await?))
}

#[derive(Debug, Serialize)]
pub struct MetadataIdResponse {
    pub id: String,
}

pub async fn metadata_id(State(state): State<AppState>) -> Json<MetadataIdResponse> {
    Json(MetadataIdResponse {
        id: state.registry.cluster_id().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct MetadataVersionResponse {
    pub version: String,
}

pub async fn metadata_version() -> Json<MetadataVersionResponse> {
    Json(MetadataVersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_latest_version_literal() {
        let mut params = HashMap::new();
        params.insert("version".to_string(), "latest".to_string());
        assert_eq!(parse_version(&params).unwrap(), -1);
    }

    #[test]
    fn rejects_non_numeric_version() {
        let mut params = HashMap::new();
        params.insert("version".to_string(), "abc".to_string());
        assert!(parse_version(&params).is_err());
    }

    #[test]
    fn context_defaults_when_absent() {
        let params = HashMap::new();
        assert_eq!(ctx(&params).unwrap(), ".");
    }
}
