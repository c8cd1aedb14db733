//! The reference `RegistryStorage` implementation: everything lives in
//! process memory behind a single reader/writer lock, mirroring the
//! concurrency model spec §5 asks every backend to provide ("a single
//! reader/writer lock over all per-context maps, writers exclusive,
//! readers parallel").
//!
//! This is the only backend this crate ships a full implementation for;
//! see `factory.rs` for how `postgres`/`mysql`/`cassandra` are recognized
//! by configuration without a driver behind them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Result, StorageError};
use crate::model::{
    ApiKeyRecord, ConfigRecord, CreateOutcome, ImportedSchema, ListSchemasParams, ModeRecord,
    NewSchema, SchemaRecord, SubjectVersion, SubjectVersionKey, UserRecord, DEFAULT_CONTEXT,
};
use crate::traits::RegistryStorage;

#[derive(Default)]
struct ContextState {
    schemas: HashMap<i64, SchemaRecord>,
    subject_versions: HashMap<String, Vec<SubjectVersion>>,
    /// Highest version ever handed out per subject, so version numbers
    /// never repeat even after a permanent delete (spec §3 invariant 1).
    version_high_water: HashMap<String, i32>,
    next_id: i64,
    configs: HashMap<String, ConfigRecord>,
    global_config: Option<ConfigRecord>,
    modes: HashMap<String, ModeRecord>,
    global_mode: Option<ModeRecord>,
}

impl ContextState {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn versions_of(&self, subject: &str) -> &[SubjectVersion] {
        self.subject_versions
            .get(subject)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn find_version<'a>(
        &'a self,
        subject: &str,
        version: i32,
        include_deleted: bool,
    ) -> Option<&'a SubjectVersion> {
        let versions = self.versions_of(subject);
        if version == -1 {
            versions
                .iter()
                .filter(|sv| include_deleted || !sv.deleted)
                .max_by_key(|sv| sv.version)
        } else {
            versions
                .iter()
                .find(|sv| sv.version == version && (include_deleted || !sv.deleted))
        }
    }

    /// Remove a schema row if no subject/version anywhere in this context
    /// still points at it (spec §3 invariant 7).
    fn gc_schema(&mut self, id: i64) {
        let still_used = self
            .subject_versions
            .values()
            .flatten()
            .any(|sv| sv.schema_id == id);
        if !still_used {
            self.schemas.remove(&id);
        }
    }
}

/// In-memory `RegistryStorage`. Cheap to construct, used both as the
/// production `storage.type = "memory"` backend and as the fixture for
/// engine/compatibility tests.
pub struct MemoryStorage {
    contexts: RwLock<HashMap<String, ContextState>>,
    auth: RwLock<AuthState>,
}

#[derive(Default)]
struct AuthState {
    users: HashMap<i64, UserRecord>,
    usernames: HashMap<String, i64>,
    next_user_id: i64,
    api_keys: HashMap<i64, ApiKeyRecord>,
    key_hash_index: HashMap<String, i64>,
    next_key_id: i64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(DEFAULT_CONTEXT.to_string(), ContextState::new());
        Self {
            contexts: RwLock::new(contexts),
            auth: RwLock::new(AuthState {
                next_user_id: 1,
                next_key_id: 1,
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl RegistryStorage for MemoryStorage {
    async fn create_schema(
        &self,
        context: &str,
        subject: &str,
        new: NewSchema,
    ) -> Result<CreateOutcome> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);

        // a subject whose versions are all soft-deleted must be restored
        // (registered to) via an explicit undelete path, not silently
        // resurrected by a plain register.
        if let Some(versions) = ctx.subject_versions.get(subject) {
            if !versions.is_empty() && versions.iter().all(|sv| sv.deleted) {
                return Err(StorageError::SubjectDeleted(subject.to_string()));
            }
        }

        // invariant 2: a live duplicate fingerprint within this subject is
        // not a new registration.
        if let Some(sv) = ctx
            .versions_of(subject)
            .iter()
            .find(|sv| {
                !sv.deleted
                    && ctx
                        .schemas
                        .get(&sv.schema_id)
                        .map(|s| s.fingerprint == new.fingerprint)
                        .unwrap_or(false)
            })
            .cloned()
        {
            return Ok(CreateOutcome::AlreadyExists {
                id: sv.schema_id,
                version: sv.version,
            });
        }

        // invariant 3: reuse an id already bound to this fingerprint
        // anywhere else in the context.
        let id = match ctx
            .schemas
            .values()
            .find(|s| s.fingerprint == new.fingerprint)
            .map(|s| s.id)
        {
            Some(existing_id) => existing_id,
            None => {
                let id = ctx.next_id;
                ctx.next_id += 1;
                ctx.schemas.insert(
                    id,
                    SchemaRecord {
                        id,
                        schema_type: new.schema_type,
                        schema: new.schema.clone(),
                        references: new.references.clone(),
                        fingerprint: new.fingerprint.clone(),
                        metadata: new.metadata.clone(),
                        rule_set: new.rule_set.clone(),
                    },
                );
                id
            }
        };

        let next_version = ctx.version_high_water.get(subject).copied().unwrap_or(0) + 1;
        ctx.version_high_water
            .insert(subject.to_string(), next_version);

        ctx.subject_versions
            .entry(subject.to_string())
            .or_default()
            .push(SubjectVersion {
                subject: subject.to_string(),
                version: next_version,
                schema_id: id,
                deleted: false,
                created_at: Utc::now(),
            });

        Ok(CreateOutcome::Created {
            id,
            version: next_version,
        })
    }

    async fn get_schema_by_id(&self, context: &str, id: i64) -> Result<SchemaRecord> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Err(StorageError::SchemaNotFound);
        };
        ctx.schemas.get(&id).cloned().ok_or(StorageError::SchemaNotFound)
    }

    async fn get_schema_by_subject_version(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        include_deleted: bool,
    ) -> Result<(SchemaRecord, SubjectVersion)> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Err(StorageError::SubjectNotFound(subject.to_string()));
        };
        if !ctx.subject_versions.contains_key(subject) {
            return Err(StorageError::SubjectNotFound(subject.to_string()));
        }
        let sv = ctx
            .find_version(subject, version, include_deleted)
            .cloned()
            .ok_or(StorageError::VersionNotFound {
                subject: subject.to_string(),
                version,
            })?;
        let schema = ctx
            .schemas
            .get(&sv.schema_id)
            .cloned()
            .ok_or(StorageError::SchemaNotFound)?;
        Ok((schema, sv))
    }

    async fn get_schemas_by_subject(
        &self,
        context: &str,
        subject: &str,
        include_deleted: bool,
    ) -> Result<Vec<(SchemaRecord, SubjectVersion)>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for sv in ctx.versions_of(subject) {
            if !include_deleted && sv.deleted {
                continue;
            }
            if let Some(schema) = ctx.schemas.get(&sv.schema_id) {
                out.push((schema.clone(), sv.clone()));
            }
        }
        out.sort_by_key(|(_, sv)| sv.version);
        Ok(out)
    }

    async fn get_schema_by_fingerprint(
        &self,
        context: &str,
        subject: &str,
        fingerprint: &str,
        include_deleted: bool,
    ) -> Result<Option<(SchemaRecord, SubjectVersion)>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        for sv in ctx.versions_of(subject) {
            if !include_deleted && sv.deleted {
                continue;
            }
            if let Some(schema) = ctx.schemas.get(&sv.schema_id) {
                if schema.fingerprint == fingerprint {
                    return Ok(Some((schema.clone(), sv.clone())));
                }
            }
        }
        Ok(None)
    }

    async fn get_schema_by_global_fingerprint(
        &self,
        context: &str,
        fingerprint: &str,
    ) -> Result<Option<SchemaRecord>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        Ok(ctx.schemas.values().find(|s| s.fingerprint == fingerprint).cloned())
    }

    async fn delete_schema(
        &self,
        context: &str,
        subject: &str,
        version: i32,
        permanent: bool,
    ) -> Result<()> {
        let mut contexts = self.contexts.write();
        let Some(ctx) = contexts.get_mut(context) else {
            return Err(StorageError::SubjectNotFound(subject.to_string()));
        };
        if !ctx.subject_versions.contains_key(subject) {
            return Err(StorageError::SubjectNotFound(subject.to_string()));
        }

        let resolved_version = if version == -1 {
            ctx.find_version(subject, -1, true)
                .map(|sv| sv.version)
                .ok_or(StorageError::VersionNotFound {
                    subject: subject.to_string(),
                    version,
                })?
        } else {
            version
        };

        let versions = ctx
            .subject_versions
            .get_mut(subject)
            .expect("subject presence checked above");
        let idx = versions
            .iter()
            .position(|sv| sv.version == resolved_version)
            .ok_or(StorageError::VersionNotFound {
                subject: subject.to_string(),
                version: resolved_version,
            })?;

        if permanent {
            if !versions[idx].deleted {
                return Err(StorageError::VersionNotSoftDeleted {
                    subject: subject.to_string(),
                    version: resolved_version,
                });
            }
            let schema_id = versions[idx].schema_id;
            versions.remove(idx);
            ctx.gc_schema(schema_id);
        } else {
            versions[idx].deleted = true;
        }
        Ok(())
    }

    async fn list_subjects(&self, context: &str, include_deleted: bool) -> Result<Vec<String>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };
        let mut subjects: Vec<String> = ctx
            .subject_versions
            .iter()
            .filter(|(_, versions)| {
                !versions.is_empty() && (include_deleted || versions.iter().any(|sv| !sv.deleted))
            })
            .map(|(s, _)| s.clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }

    async fn subject_exists(&self, context: &str, subject: &str) -> Result<bool> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(false);
        };
        Ok(ctx
            .subject_versions
            .get(subject)
            .map(|v| v.iter().any(|sv| !sv.deleted))
            .unwrap_or(false))
    }

    async fn delete_subject(
        &self,
        context: &str,
        subject: &str,
        permanent: bool,
    ) -> Result<Vec<i32>> {
        let mut contexts = self.contexts.write();
        let Some(ctx) = contexts.get_mut(context) else {
            return Err(StorageError::SubjectNotFound(subject.to_string()));
        };
        let versions = ctx
            .subject_versions
            .get(subject)
            .ok_or_else(|| StorageError::SubjectNotFound(subject.to_string()))?
            .clone();

        if permanent {
            if versions.iter().any(|sv| !sv.deleted) {
                return Err(StorageError::SubjectNotSoftDeleted(subject.to_string()));
            }
            let ids: Vec<i64> = versions.iter().map(|sv| sv.schema_id).collect();
            ctx.subject_versions.remove(subject);
            ctx.version_high_water.remove(subject);
            for id in ids {
                ctx.gc_schema(id);
            }
        } else {
            let entry = ctx.subject_versions.get_mut(subject).unwrap();
            for sv in entry.iter_mut() {
                sv.deleted = true;
            }
        }
        Ok(versions.iter().map(|sv| sv.version).collect())
    }

    async fn list_schemas(
        &self,
        context: &str,
        params: ListSchemasParams,
    ) -> Result<Vec<(SchemaRecord, SubjectVersion)>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(SchemaRecord, SubjectVersion)> = Vec::new();
        for (subject, versions) in &ctx.subject_versions {
            if let Some(prefix) = &params.subject_prefix {
                if !subject.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            let mut candidates: Vec<&SubjectVersion> = versions
                .iter()
                .filter(|sv| params.deleted || !sv.deleted)
                .collect();
            if params.latest_only {
                candidates.sort_by_key(|sv| sv.version);
                candidates = match candidates.last() {
                    Some(last) => vec![*last],
                    None => vec![],
                };
            }
            for sv in candidates {
                if let Some(schema) = ctx.schemas.get(&sv.schema_id) {
                    rows.push((schema.clone(), sv.clone()));
                }
            }
        }
        rows.sort_by_key(|(schema, _)| schema.id);

        let offset = params.offset.min(rows.len());
        let rows = if let Some(limit) = params.limit {
            rows.into_iter().skip(offset).take(limit).collect()
        } else {
            rows.into_iter().skip(offset).collect()
        };
        Ok(rows)
    }

    async fn get_referenced_by(
        &self,
        context: &str,
        subject: &str,
        version: i32,
    ) -> Result<Vec<SubjectVersionKey>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (s, versions) in &ctx.subject_versions {
            for sv in versions {
                if let Some(schema) = ctx.schemas.get(&sv.schema_id) {
                    if schema
                        .references
                        .iter()
                        .any(|r| r.subject == subject && r.version == version)
                    {
                        out.push(SubjectVersionKey {
                            subject: s.clone(),
                            version: sv.version,
                        });
                    }
                }
            }
        }
        out.sort_by(|a, b| (a.subject.as_str(), a.version).cmp(&(b.subject.as_str(), b.version)));
        Ok(out)
    }

    async fn get_subjects_by_schema_id(
        &self,
        context: &str,
        id: i64,
        include_deleted: bool,
    ) -> Result<Vec<String>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };
        let mut subjects: Vec<String> = ctx
            .subject_versions
            .iter()
            .filter(|(_, versions)| {
                versions
                    .iter()
                    .any(|sv| sv.schema_id == id && (include_deleted || !sv.deleted))
            })
            .map(|(s, _)| s.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        Ok(subjects)
    }

    async fn get_versions_by_schema_id(
        &self,
        context: &str,
        id: i64,
        include_deleted: bool,
    ) -> Result<Vec<SubjectVersionKey>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (s, versions) in &ctx.subject_versions {
            for sv in versions {
                if sv.schema_id == id && (include_deleted || !sv.deleted) {
                    out.push(SubjectVersionKey {
                        subject: s.clone(),
                        version: sv.version,
                    });
                }
            }
        }
        out.sort_by(|a, b| (a.subject.as_str(), a.version).cmp(&(b.subject.as_str(), b.version)));
        Ok(out)
    }

    async fn get_config(&self, context: &str, subject: &str) -> Result<Option<ConfigRecord>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        Ok(ctx.configs.get(subject).cloned())
    }

    async fn set_config(&self, context: &str, subject: &str, config: ConfigRecord) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        ctx.configs.insert(subject.to_string(), config);
        Ok(())
    }

    async fn delete_config(&self, context: &str, subject: &str) -> Result<()> {
        let mut contexts = self.contexts.write();
        if let Some(ctx) = contexts.get_mut(context) {
            ctx.configs.remove(subject);
        }
        Ok(())
    }

    async fn get_global_config(&self, context: &str) -> Result<Option<ConfigRecord>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        Ok(ctx.global_config.clone())
    }

    async fn set_global_config(&self, context: &str, config: ConfigRecord) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        ctx.global_config = Some(config);
        Ok(())
    }

    async fn delete_global_config(&self, context: &str) -> Result<()> {
        let mut contexts = self.contexts.write();
        if let Some(ctx) = contexts.get_mut(context) {
            ctx.global_config = None;
        }
        Ok(())
    }

    async fn get_mode(&self, context: &str, subject: &str) -> Result<Option<ModeRecord>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        Ok(ctx.modes.get(subject).copied())
    }

    async fn set_mode(&self, context: &str, subject: &str, mode: ModeRecord) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        ctx.modes.insert(subject.to_string(), mode);
        Ok(())
    }

    async fn delete_mode(&self, context: &str, subject: &str) -> Result<()> {
        let mut contexts = self.contexts.write();
        if let Some(ctx) = contexts.get_mut(context) {
            ctx.modes.remove(subject);
        }
        Ok(())
    }

    async fn get_global_mode(&self, context: &str) -> Result<Option<ModeRecord>> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(None);
        };
        Ok(ctx.global_mode)
    }

    async fn set_global_mode(&self, context: &str, mode: ModeRecord) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        ctx.global_mode = Some(mode);
        Ok(())
    }

    async fn delete_global_mode(&self, context: &str) -> Result<()> {
        let mut contexts = self.contexts.write();
        if let Some(ctx) = contexts.get_mut(context) {
            ctx.global_mode = None;
        }
        Ok(())
    }

    async fn next_id(&self, context: &str) -> Result<i64> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        let id = ctx.next_id;
        ctx.next_id += 1;
        Ok(id)
    }

    async fn get_max_schema_id(&self, context: &str) -> Result<i64> {
        let contexts = self.contexts.read();
        let Some(ctx) = contexts.get(context) else {
            return Ok(0);
        };
        Ok(ctx.next_id - 1)
    }

    async fn set_next_id(&self, context: &str, value: i64) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);
        ctx.next_id = value;
        Ok(())
    }

    async fn import_schema(&self, context: &str, imported: ImportedSchema) -> Result<()> {
        let mut contexts = self.contexts.write();
        let ctx = contexts
            .entry(context.to_string())
            .or_insert_with(ContextState::new);

        if let Some(existing) = ctx.schemas.get(&imported.id) {
            if existing.fingerprint != imported.new.fingerprint {
                return Err(StorageError::SchemaIdConflict { id: imported.id });
            }
        } else {
            ctx.schemas.insert(
                imported.id,
                SchemaRecord {
                    id: imported.id,
                    schema_type: imported.new.schema_type,
                    schema: imported.new.schema.clone(),
                    references: imported.new.references.clone(),
                    fingerprint: imported.new.fingerprint.clone(),
                    metadata: imported.new.metadata.clone(),
                    rule_set: imported.new.rule_set.clone(),
                },
            );
        }

        let already_present = ctx
            .versions_of(&imported.subject)
            .iter()
            .any(|sv| sv.version == imported.version);
        if already_present {
            return Err(StorageError::SubjectVersionExists {
                subject: imported.subject,
                version: imported.version,
            });
        }

        let hw = ctx
            .version_high_water
            .entry(imported.subject.clone())
            .or_insert(0);
        *hw = (*hw).max(imported.version);

        ctx.subject_versions
            .entry(imported.subject.clone())
            .or_default()
            .push(SubjectVersion {
                subject: imported.subject,
                version: imported.version,
                schema_id: imported.id,
                deleted: false,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn list_contexts(&self) -> Result<Vec<String>> {
        let contexts = self.contexts.read();
        let mut names: Vec<String> = contexts.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_user(&self, username: &str, roles: Vec<String>) -> Result<UserRecord> {
        let mut auth = self.auth.write();
        if auth.usernames.contains_key(username) {
            return Err(StorageError::UserExists(username.to_string()));
        }
        let id = auth.next_user_id;
        auth.next_user_id += 1;
        let record = UserRecord {
            id,
            username: username.to_string(),
            roles,
            created_at: Utc::now(),
        };
        auth.usernames.insert(username.to_string(), id);
        auth.users.insert(id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: i64) -> Result<UserRecord> {
        let auth = self.auth.read();
        auth.users
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound(id.to_string()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<UserRecord> {
        let auth = self.auth.read();
        let id = auth
            .usernames
            .get(username)
            .copied()
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))?;
        Ok(auth.users[&id].clone())
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let mut auth = self.auth.write();
        let record = auth
            .users
            .remove(&id)
            .ok_or_else(|| StorageError::UserNotFound(id.to_string()))?;
        auth.usernames.remove(&record.username);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let auth = self.auth.read();
        let mut users: Vec<UserRecord> = auth.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn create_api_key(
        &self,
        user_id: i64,
        name: &str,
        key_hash: &str,
    ) -> Result<ApiKeyRecord> {
        let mut auth = self.auth.write();
        if !auth.users.contains_key(&user_id) {
            return Err(StorageError::UserNotFound(user_id.to_string()));
        }
        if auth.key_hash_index.contains_key(key_hash) {
            return Err(StorageError::ApiKeyExists(name.to_string()));
        }
        let id = auth.next_key_id;
        auth.next_key_id += 1;
        let record = ApiKeyRecord {
            id,
            user_id,
            name: name.to_string(),
            key_hash: key_hash.to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };
        auth.key_hash_index.insert(key_hash.to_string(), id);
        auth.api_keys.insert(id, record.clone());
        Ok(record)
    }

    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<ApiKeyRecord> {
        let auth = self.auth.read();
        let id = auth
            .key_hash_index
            .get(key_hash)
            .copied()
            .ok_or(StorageError::ApiKeyNotFound)?;
        Ok(auth.api_keys[&id].clone())
    }

    async fn delete_api_key(&self, id: i64) -> Result<()> {
        let mut auth = self.auth.write();
        let record = auth.api_keys.remove(&id).ok_or(StorageError::ApiKeyNotFound)?;
        auth.key_hash_index.remove(&record.key_hash);
        Ok(())
    }

    async fn update_api_key_last_used(&self, id: i64) -> Result<()> {
        let mut auth = self.auth.write();
        let record = auth.api_keys.get_mut(&id).ok_or(StorageError::ApiKeyNotFound)?;
        record.last_used_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaType;

    fn avro_schema(body: &str) -> NewSchema {
        NewSchema {
            schema_type: SchemaType::Avro,
            schema: body.to_string(),
            references: vec![],
            fingerprint: format!("fp:{body}"),
            metadata: None,
            rule_set: None,
        }
    }

    #[tokio::test]
    async fn create_then_reread_latest() {
        let storage = MemoryStorage::new();
        let outcome = storage
            .create_schema(".", "orders-value", avro_schema("v1"))
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created { id: 1, version: 1 });

        let (schema, sv) = storage.get_latest_schema(".", "orders-value").await.unwrap();
        assert_eq!(schema.id, 1);
        assert_eq!(sv.version, 1);
    }

    #[tokio::test]
    async fn duplicate_fingerprint_same_subject_is_already_exists() {
        let storage = MemoryStorage::new();
        storage
            .create_schema(".", "orders-value", avro_schema("v1"))
            .await
            .unwrap();
        let outcome = storage
            .create_schema(".", "orders-value", avro_schema("v1"))
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists { id: 1, version: 1 });
    }

    #[tokio::test]
    async fn duplicate_fingerprint_other_subject_reuses_id_new_version() {
        let storage = MemoryStorage::new();
        storage
            .create_schema(".", "orders-value", avro_schema("shared"))
            .await
            .unwrap();
        let outcome = storage
            .create_schema(".", "other-value", avro_schema("shared"))
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created { id: 1, version: 1 });
    }

    #[tokio::test]
    async fn version_numbers_never_reused_after_permanent_delete() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        storage.create_schema(".", "s", avro_schema("v2")).await.unwrap();
        storage.delete_schema(".", "s", 2, false).await.unwrap();
        storage.delete_schema(".", "s", 2, true).await.unwrap();

        let outcome = storage.create_schema(".", "s", avro_schema("v3")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created { id: 3, version: 3 });
    }

    #[tokio::test]
    async fn permanent_delete_requires_soft_delete_first() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        let err = storage.delete_schema(".", "s", 1, true).await.unwrap_err();
        assert!(matches!(err, StorageError::VersionNotSoftDeleted { .. }));
    }

    #[tokio::test]
    async fn schema_row_garbage_collected_when_last_reference_removed() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        storage.delete_schema(".", "s", 1, false).await.unwrap();
        storage.delete_schema(".", "s", 1, true).await.unwrap();
        let err = storage.get_schema_by_id(".", 1).await.unwrap_err();
        assert!(matches!(err, StorageError::SchemaNotFound));
    }

    #[tokio::test]
    async fn soft_deleted_subject_hidden_until_deleted_flag_set() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        storage.delete_subject(".", "s", false).await.unwrap();

        assert!(storage.list_subjects(".", false).await.unwrap().is_empty());
        assert_eq!(storage.list_subjects(".", true).await.unwrap(), vec!["s".to_string()]);
    }

    #[tokio::test]
    async fn registering_against_soft_deleted_subject_fails() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        storage.delete_subject(".", "s", false).await.unwrap();

        let err = storage.create_schema(".", "s", avro_schema("v2")).await.unwrap_err();
        assert!(matches!(err, StorageError::SubjectDeleted(_)));
    }

    #[tokio::test]
    async fn contexts_are_isolated() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();
        storage.create_schema(".prod", "s", avro_schema("v1")).await.unwrap();

        let (schema_default, _) = storage.get_latest_schema(".", "s").await.unwrap();
        let (schema_prod, _) = storage.get_latest_schema(".prod", "s").await.unwrap();
        assert_eq!(schema_default.id, 1);
        assert_eq!(schema_prod.id, 1);
    }

    #[tokio::test]
    async fn reads_against_an_untouched_context_are_empty_not_errors() {
        let storage = MemoryStorage::new();
        storage.create_schema(".", "s", avro_schema("v1")).await.unwrap();

        assert!(storage.list_subjects(".other", false).await.unwrap().is_empty());
        assert!(!storage.subject_exists(".other", "s").await.unwrap());
        assert!(storage.get_global_mode(".other").await.unwrap().is_none());
        assert!(storage.get_config(".other", "s").await.unwrap().is_none());
        assert!(storage
            .get_schema_by_fingerprint(".other", "s", "fp:v1", false)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn import_rejects_id_reused_for_different_content() {
        let storage = MemoryStorage::new();
        storage.set_next_id(".", 100).await.unwrap();
        storage
            .import_schema(
                ".",
                ImportedSchema {
                    id: 50,
                    subject: "s".to_string(),
                    version: 1,
                    new: avro_schema("v1"),
                },
            )
            .await
            .unwrap();

        let err = storage
            .import_schema(
                ".",
                ImportedSchema {
                    id: 50,
                    subject: "other".to_string(),
                    version: 1,
                    new: avro_schema("v2"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SchemaIdConflict { id: 50 }));
    }
}
