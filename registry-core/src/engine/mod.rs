//! The `Registry` engine (spec §4.4): orchestrates Storage,
//! `SchemaTypeRegistry`, and `CompatibilityRegistry` into the register/
//! lookup/delete/compat-check/import operations.

use std::collections::HashMap;
use std::sync::Arc;

use registry_storage::model::{
    CompatibilityLevel, ConfigRecord, ImportedSchema, ListSchemasParams, Mode, ModeRecord,
    NewSchema, Reference, SchemaRecord, SchemaType, SubjectVersion, SubjectVersionKey,
};
use registry_storage::RegistryStorage;

use crate::compatibility::{CompatibilityRegistry, CompatibilityReport};
use crate::error::{Error, Result};
use crate::schema::{SchemaTypeRegistry, SchemaWithReferences};

/// A schema submitted for registration or compatibility checking, before
/// an id/version has been assigned (spec §4.4 `RegisterSchema`).
#[derive(Debug, Clone)]
pub struct SchemaRequest {
    pub schema_type: Option<SchemaType>,
    pub schema: String,
    pub references: Vec<Reference>,
    pub metadata: Option<serde_json::Value>,
    pub rule_set: Option<serde_json::Value>,
}

/// Which existing versions a compatibility check or registration should
/// be evaluated against (spec §4.4 `CheckCompatibility`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Version(i32),
    Latest,
    All,
}

/// One item of a batch import request (spec §4.4 `ImportSchemas`).
#[derive(Debug, Clone)]
pub struct ImportItem {
    pub id: i64,
    pub subject: String,
    pub version: i32,
    pub request: SchemaRequest,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub imported: usize,
    pub errors: Vec<(usize, String)>,
    pub results: Vec<Option<(i64, i32)>>,
}

/// Orchestrates register/lookup/delete/compat-check/import flows
/// (spec §2's "Registry (the engine)" row). Holds one `Arc<dyn
/// RegistryStorage>` shared across every concurrently-handled request,
/// as the storage contract's thread-safety note requires.
pub struct Registry {
    storage: Arc<dyn RegistryStorage>,
    schemas: SchemaTypeRegistry,
    compatibility: CompatibilityRegistry,
    cluster_id: String,
}

impl Registry {
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        Self {
            storage,
            schemas: SchemaTypeRegistry::new(),
            compatibility: CompatibilityRegistry::new(),
            cluster_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// A stable identifier for this running process (spec §4.4
    /// `GetClusterID`). Generated once at startup; no storage operation
    /// persists it across restarts since the contract has no slot for it
    /// (documented in `DESIGN.md`).
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn supported_schema_types(&self) -> Vec<SchemaType> {
        self.schemas.supported_types()
    }

    async fn resolve_references(
        &self,
        context: &str,
        references: &[Reference],
    ) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();
        for reference in references {
            let (record, _) = self
                .storage
                .get_schema_by_subject_version(context, &reference.subject, reference.version, false)
                .await
                .map_err(|_| {
                    Error::Invalid(format!(
                        "missing reference: {} ({}/{})",
                        reference.name, reference.subject, reference.version
                    ))
                })?;
            resolved.insert(reference.name.clone(), record.schema);
        }
        Ok(resolved)
    }

    fn schema_view(
        &self,
        schema_type: SchemaType,
        text: String,
        references: Vec<Reference>,
        resolved: HashMap<String, String>,
    ) -> SchemaWithReferences {
        SchemaWithReferences {
            schema_type,
            text,
            references,
            resolved,
        }
    }

    async fn parse_request(
        &self,
        context: &str,
        request: &SchemaRequest,
    ) -> Result<(crate::schema::ParsedSchema, String, String, SchemaType)> {
        let schema_type = request.schema_type.unwrap_or_default();
        let resolved = self.resolve_references(context, &request.references).await?;
        let view = self.schema_view(
            schema_type,
            request.schema.clone(),
            request.references.clone(),
            resolved,
        );
        let (parsed, canonical, fingerprint) = self.schemas.parse_and_fingerprint(&view)?;
        Ok((parsed, canonical, fingerprint, schema_type))
    }

    async fn effective_compatibility(&self, context: &str, subject: &str) -> Result<CompatibilityLevel> {
        if let Some(config) = self.storage.get_config(context, subject).await? {
            if let Some(level) = config.compatibility_level {
                return Ok(level);
            }
        }
        if let Some(config) = self.storage.get_global_config(context).await? {
            if let Some(level) = config.compatibility_level {
                return Ok(level);
            }
        }
        Ok(CompatibilityLevel::Backward)
    }

    async fn effective_mode(&self, context: &str, subject: &str) -> Result<Mode> {
        if let Some(mode) = self.storage.get_mode(context, subject).await? {
            return Ok(mode.mode);
        }
        if let Some(mode) = self.storage.get_global_mode(context).await? {
            return Ok(mode.mode);
        }
        Ok(Mode::ReadWrite)
    }

    /// Parse every live version of `subject` with the same reference view
    /// a fresh candidate would use (spec §4.3: "The Checker receives the
    /// same `SchemaWithReferences` view the parsers use").
    async fn parsed_history(
        &self,
        context: &str,
        subject: &str,
    ) -> Result<Vec<crate::schema::ParsedSchema>> {
        let rows = self.storage.get_schemas_by_subject(context, subject, false).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (record, _) in rows {
            let resolved = self.resolve_references(context, &record.references).await?;
            let view = self.schema_view(record.schema_type, record.schema, record.references, resolved);
            let (parsed, _, _) = self.schemas.parse_and_fingerprint(&view)?;
            out.push(parsed);
        }
        Ok(out)
    }

    /// Spec §4.4 `RegisterSchema`.
    pub async fn register_schema(
        &self,
        context: &str,
        subject: &str,
        request: SchemaRequest,
    ) -> Result<(i64, i32)> {
        if self.effective_mode(context, subject).await? != Mode::ReadWrite {
            return Err(Error::PreconditionFailed(format!(
                "subject '{subject}' is not in READWRITE mode"
            )));
        }

        let (_, _, fingerprint, schema_type) = self.parse_request(context, &request).await?;

        if let Some((record, version)) = self
            .storage
            .get_schema_by_fingerprint(context, subject, &fingerprint, false)
            .await?
        {
            return Ok((record.id, version.version));
        }

        let level = self.effective_compatibility(context, subject).await?;
        if level != CompatibilityLevel::None {
            let history = self.parsed_history(context, subject).await?;
            if !history.is_empty() {
                let (candidate, _, _, _) = self.parse_request(context, &request).await?;
                let report = self.compatibility.check(level, schema_type, &candidate, &history)?;
                if !report.is_compatible {
                    return Err(Error::Incompatible {
                        messages: report.messages,
                    });
                }
            }
        }

        let new = NewSchema {
            schema_type,
            schema: request.schema,
            references: request.references,
            fingerprint,
            metadata: request.metadata,
            rule_set: request.rule_set,
        };
        let outcome = self.storage.create_schema(context, subject, new).await?;
        Ok((outcome.id(), outcome.version()))
    }

    /// Spec §4.4 `LookupSchema`.
    pub async fn lookup_schema(
        &self,
        context: &str,
        subject: &str,
        request: SchemaRequest,
        include_deleted: bool,
    ) -> Result<(i64, i32)> {
        let (_, _, fingerprint, _) = self.parse_request(context, &request).await?;
        match self
            .storage
            .get_schema_by_fingerprint(context, subject, &fingerprint, include_deleted)
            .await?
        {
            Some((record, version)) => Ok((record.id, version.version)),
            None => Err(Error::NotFound(format!("no matching schema for subject '{subject}'"))),
        }
    }

    pub async fn get_schema_by_id(&self, context: &str, id: i64) -> Result<SchemaRecord> {
        Ok(self.storage.get_schema_by_id(context, id).await?)
    }

    /// Best-effort fully-qualified name for `record`, derived by parsing
    /// it fresh (never stored; SPEC_FULL §3 `schemaIdentity`).
    pub async fn schema_identity(&self, context: &str, record: &SchemaRecord) -> Result<Option<String>> {
        let resolved = self.resolve_references(context, &record.references).await?;
        let view = self.schema_view(
            record.schema_type,
            record.schema.clone(),
            record.references.clone(),
            resolved,
        );
        let (parsed, _, _) = self.schemas.parse_and_fingerprint(&view)?;
        Ok(crate::schema::schema_identity(&parsed))
    }

    pub async fn get_version(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        include_deleted: bool,
    ) -> Result<(SchemaRecord, SubjectVersion)> {
        Ok(self
            .storage
            .get_schema_by_subject_version(context, subject, version, include_deleted)
            .await?)
    }

    pub async fn get_latest(&self, context: &str, subject: &str) -> Result<(SchemaRecord, SubjectVersion)> {
        self.get_version(context, subject, -1, false).await
    }

    pub async fn get_versions(
        &self,
        context: &str,
        subject: &str,
        include_deleted: bool,
    ) -> Result<Vec<i32>> {
        let rows = self
            .storage
            .get_schemas_by_subject(context, subject, include_deleted)
            .await?;
        if rows.is_empty() && !self.storage.subject_exists(context, subject).await? {
            return Err(Error::NotFound(format!("subject not found: {subject}")));
        }
        Ok(rows.into_iter().map(|(_, sv)| sv.version).collect())
    }

    pub async fn list_subjects(&self, context: &str, include_deleted: bool) -> Result<Vec<String>> {
        Ok(self.storage.list_subjects(context, include_deleted).await?)
    }

    pub async fn list_schemas(
        &self,
        context: &str,
        params: ListSchemasParams,
    ) -> Result<Vec<(SchemaRecord, SubjectVersion)>> {
        Ok(self.storage.list_schemas(context, params).await?)
    }

    pub async fn get_referenced_by(
        &self,
        context: &str,
        subject: &str,
        version: i32,
    ) -> Result<Vec<SubjectVersionKey>> {
        Ok(self.storage.get_referenced_by(context, subject, version).await?)
    }

    pub async fn get_subjects_by_schema_id(&self, context: &str, id: i64) -> Result<Vec<String>> {
        Ok(self.storage.get_subjects_by_schema_id(context, id, false).await?)
    }

    pub async fn get_versions_by_schema_id(
        &self,
        context: &str,
        id: i64,
    ) -> Result<Vec<SubjectVersionKey>> {
        Ok(self.storage.get_versions_by_schema_id(context, id, false).await?)
    }

    pub async fn delete_version(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        permanent: bool,
    ) -> Result<()> {
        Ok(self.storage.delete_schema(context, subject, version, permanent).await?)
    }

    pub async fn delete_subject(&self, context: &str, subject: &str, permanent: bool) -> Result<Vec<i32>> {
        Ok(self.storage.delete_subject(context, subject, permanent).await?)
    }

    pub async fn get_config(&self, context: &str, subject: &str) -> Result<Option<ConfigRecord>> {
        Ok(self.storage.get_config(context, subject).await?)
    }

    pub async fn set_config(&self, context: &str, subject: &str, config: ConfigRecord) -> Result<()> {
        Ok(self.storage.set_config(context, subject, config).await?)
    }

    pub async fn delete_config(&self, context: &str, subject: &str) -> Result<()> {
        Ok(self.storage.delete_config(context, subject).await?)
    }

    pub async fn get_global_config(&self, context: &str) -> Result<Option<ConfigRecord>> {
        Ok(self.storage.get_global_config(context).await?)
    }

    pub async fn set_global_config(&self, context: &str, config: ConfigRecord) -> Result<()> {
        Ok(self.storage.set_global_config(context, config).await?)
    }

    pub async fn get_mode(&self, context: &str, subject: &str) -> Result<Option<ModeRecord>> {
        Ok(self.storage.get_mode(context, subject).await?)
    }

    pub async fn set_mode(&self, context: &str, subject: &str, mode: ModeRecord) -> Result<()> {
        Ok(self.storage.set_mode(context, subject, mode).await?)
    }

    pub async fn get_global_mode(&self, context: &str) -> Result<Option<ModeRecord>> {
        Ok(self.storage.get_global_mode(context).await?)
    }

    pub async fn set_global_mode(&self, context: &str, mode: ModeRecord) -> Result<()> {
        Ok(self.storage.set_global_mode(context, mode).await?)
    }

    pub async fn delete_mode(&self, context: &str, subject: &str) -> Result<()> {
        Ok(self.storage.delete_mode(context, subject).await?)
    }

    pub async fn delete_global_mode(&self, context: &str) -> Result<()> {
        Ok(self.storage.delete_global_mode(context).await?)
    }

    /// Spec §4.4 `CheckCompatibility`: "when the path specifies `versions`
    /// (plural) or `all`, always run the transitive variant regardless of
    /// stored config."
    pub async fn check_compatibility(
        &self,
        context: &str,
        subject: &str,
        selector: VersionSelector,
        request: SchemaRequest,
    ) -> Result<CompatibilityReport> {
        let (candidate, _, _, schema_type) = self.parse_request(context, &request).await?;

        let history = match selector {
            VersionSelector::Version(version) => {
                let (record, _) = self
                    .storage
                    .get_schema_by_subject_version(context, subject, version, false)
                    .await?;
                let resolved = self.resolve_references(context, &record.references).await?;
                let view = self.schema_view(record.schema_type, record.schema, record.references, resolved);
                let (parsed, _, _) = self.schemas.parse_and_fingerprint(&view)?;
                vec![parsed]
            }
            VersionSelector::Latest | VersionSelector::All => self.parsed_history(context, subject).await?,
        };

        let mode = match selector {
            VersionSelector::Version(_) | VersionSelector::Latest => {
                self.effective_compatibility(context, subject).await?
            }
            VersionSelector::All => transitive_variant(self.effective_compatibility(context, subject).await?),
        };

        self.compatibility.check(mode, schema_type, &candidate, &history)
    }

    /// Spec §4.4 `ImportSchemas`: two-phase validate-then-commit, followed
    /// by `SetNextID(maxImportedID + 1)`.
    pub async fn import_schemas(&self, context: &str, items: Vec<ImportItem>) -> Result<ImportOutcome> {
        let mut validated = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match self.parse_request(context, &item.request).await {
                Ok((_, _, fingerprint, schema_type)) => validated.push(Some((idx, fingerprint, schema_type))),
                Err(e) => {
                    validated.push(None);
                    errors.push((idx, e.to_string()));
                }
            }
        }

        let mut results = vec![None; items.len()];
        let mut max_id = 0i64;
        for (idx, item) in items.into_iter().enumerate() {
            let Some((_, fingerprint, schema_type)) = &validated[idx] else {
                continue;
            };
            let new = NewSchema {
                schema_type: *schema_type,
                schema: item.request.schema,
                references: item.request.references,
                fingerprint: fingerprint.clone(),
                metadata: item.request.metadata,
                rule_set: item.request.rule_set,
            };
            let imported = ImportedSchema {
                id: item.id,
                subject: item.subject,
                version: item.version,
                new,
            };
            match self.storage.import_schema(context, imported).await {
                Ok(()) => {
                    max_id = max_id.max(item.id);
                    results[idx] = Some((item.id, item.version));
                }
                Err(e) => errors.push((idx, e.to_string())),
            }
        }

        if max_id > 0 {
            self.storage.set_next_id(context, max_id + 1).await?;
        }

        Ok(ImportOutcome {
            imported: results.iter().filter(|r| r.is_some()).count(),
            errors,
            results,
        })
    }

    pub async fn get_contexts(&self) -> Result<Vec<String>> {
        Ok(self.storage.list_contexts().await?)
    }
}

fn transitive_variant(level: CompatibilityLevel) -> CompatibilityLevel {
    match level {
        CompatibilityLevel::Backward => CompatibilityLevel::BackwardTransitive,
        CompatibilityLevel::Forward => CompatibilityLevel::ForwardTransitive,
        CompatibilityLevel::Full => CompatibilityLevel::FullTransitive,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_storage::MemoryStorage;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStorage::new()))
    }

    fn avro_request(body: &str) -> SchemaRequest {
        SchemaRequest {
            schema_type: Some(SchemaType::Avro),
            schema: body.to_string(),
            references: vec![],
            metadata: None,
            rule_set: None,
        }
    }

    #[tokio::test]
    async fn register_dedups_within_subject() {
        let engine = registry();
        let body = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        let (id1, v1) = engine
            .register_schema(".", "s", avro_request(body))
            .await
            .unwrap();
        let (id2, v2) = engine
            .register_schema(".", "s", avro_request(body))
            .await
            .unwrap();
        assert_eq!((id1, v1), (id2, v2));
    }

    #[tokio::test]
    async fn register_dedups_globally_across_subjects() {
        let engine = registry();
        let body = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        let (id1, _) = engine
            .register_schema(".", "s1", avro_request(body))
            .await
            .unwrap();
        let (id2, v2) = engine
            .register_schema(".", "s2", avro_request(body))
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(v2, 1);
    }

    #[tokio::test]
    async fn register_rejects_backward_incompatible_field_removal() {
        let engine = registry();
        let v1 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"},{"name":"b","type":"string"}]}"#;
        let v2 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        engine.register_schema(".", "s", avro_request(v1)).await.unwrap();
        let err = engine.register_schema(".", "s", avro_request(v2)).await.unwrap_err();
        assert!(matches!(err, Error::Incompatible { .. }));
    }

    #[tokio::test]
    async fn contexts_are_isolated_for_the_engine() {
        let engine = registry();
        let body = r#"{"type":"record","name":"R","fields":[]}"#;
        engine.register_schema(".", "s", avro_request(body)).await.unwrap();
        assert!(engine.list_subjects(".prod", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_reregister_allocates_new_version() {
        let engine = registry();
        let v1 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        let v2 = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"},{"name":"b","type":"string","default":""}]}"#;
        engine.register_schema(".", "s", avro_request(v1)).await.unwrap();
        engine.delete_version(".", "s", 1, false).await.unwrap();
        let (_, version) = engine.register_schema(".", "s", avro_request(v2)).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn import_preserves_caller_ids_and_continues_natural_allocation() {
        let engine = registry();
        let item = ImportItem {
            id: 50,
            subject: "s".to_string(),
            version: 1,
            request: avro_request(r#"{"type":"record","name":"R","fields":[]}"#),
        };
        let outcome = engine.import_schemas(".", vec![item]).await.unwrap();
        assert_eq!(outcome.imported, 1);
        assert!(outcome.errors.is_empty());

        let (id, version) = engine
            .register_schema(".", "s2", avro_request(r#"{"type":"record","name":"S","fields":[]}"#))
            .await
            .unwrap();
        assert!(id > 50);
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn read_only_mode_blocks_registration() {
        let engine = registry();
        engine
            .set_global_mode(".", ModeRecord { mode: Mode::ReadOnly })
            .await
            .unwrap();
        let err = engine
            .register_schema(".", "s", avro_request(r#"{"type":"record","name":"R","fields":[]}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }
}
