//! End-to-end scenarios (spec §8 "End-to-end scenarios (literal)"),
//! driving the engine directly rather than through the HTTP adapter.

use std::sync::Arc;

use registry_core::engine::{ImportItem, Registry, SchemaRequest, VersionSelector};
use registry_core::error::Error;
use registry_storage::model::Reference;
use registry_storage::MemoryStorage;

fn engine() -> Registry {
    Registry::new(Arc::new(MemoryStorage::new()))
}

fn request(body: &str) -> SchemaRequest {
    SchemaRequest {
        schema_type: None,
        schema: body.to_string(),
        references: Vec::<Reference>::new(),
        metadata: None,
        rule_set: None,
    }
}

#[tokio::test]
async fn register_and_dedup_within_subject() {
    let engine = engine();
    let (id, version) = engine
        .register_schema(".", "orders-value", request(r#"{"type":"string"}"#))
        .await
        .unwrap();
    assert_eq!((id, version), (1, 1));

    let (id2, version2) = engine
        .register_schema(".", "orders-value", request(r#"{"type":"string"}"#))
        .await
        .unwrap();
    assert_eq!((id2, version2), (1, 1));

    let versions = engine.get_versions(".", "orders-value", false).await.unwrap();
    assert_eq!(versions, vec![1]);
}

#[tokio::test]
async fn global_dedup_across_subjects() {
    let engine = engine();
    engine
        .register_schema(".", "orders-value", request(r#"{"type":"string"}"#))
        .await
        .unwrap();

    let (id, _) = engine
        .register_schema(".", "other-value", request(r#"{"type":"string"}"#))
        .await
        .unwrap();
    assert_eq!(id, 1);

    let subjects = engine.list_subjects(".", false).await.unwrap();
    assert_eq!(subjects, vec!["orders-value".to_string(), "other-value".to_string()]);

    let owners = engine.get_subjects_by_schema_id(".", 1).await.unwrap();
    assert_eq!(owners, vec!["orders-value".to_string(), "other-value".to_string()]);
}

#[tokio::test]
async fn backward_evolution_rejects_field_removal() {
    let engine = engine();
    let v1 = r#"{"type":"record","name":"R","fields":[{"name":"id","type":"long"},{"name":"name","type":"string"}]}"#;
    let (id1, ver1) = engine.register_schema(".", "s", request(v1)).await.unwrap();
    assert_eq!((id1, ver1), (1, 1));

    let v2 = r#"{"type":"record","name":"R","fields":[{"name":"id","type":"long"},{"name":"name","type":"string"},{"name":"email","type":["null","string"],"default":null}]}"#;
    let (id2, ver2) = engine.register_schema(".", "s", request(v2)).await.unwrap();
    assert_eq!((id2, ver2), (2, 2));

    let v3 = r#"{"type":"record","name":"R","fields":[{"name":"id","type":"long"}]}"#;
    let err = engine.register_schema(".", "s", request(v3)).await.unwrap_err();
    assert!(matches!(err, Error::Incompatible { .. }));
}

#[tokio::test]
async fn contexts_isolate_subjects_and_ids() {
    let engine = engine();
    let (prod_id, _) = engine
        .register_schema(".prod", "s", request(r#"{"type":"int"}"#))
        .await
        .unwrap();
    assert_eq!(prod_id, 1);

    let (stage_id, _) = engine
        .register_schema(".stage", "s", request(r#"{"type":"int"}"#))
        .await
        .unwrap();
    assert_eq!(stage_id, 1);

    assert_eq!(engine.list_subjects(".prod", false).await.unwrap(), vec!["s".to_string()]);
    assert_eq!(engine.list_subjects(".stage", false).await.unwrap(), vec!["s".to_string()]);
    assert!(engine.list_subjects(".", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_then_reregister_allocates_next_version_same_id() {
    let engine = engine();
    let body = r#"{"type":"record","name":"A","fields":[{"name":"x","type":"int"}]}"#;
    let (id1, ver1) = engine.register_schema(".", "s", request(body)).await.unwrap();
    assert_eq!((id1, ver1), (1, 1));

    engine.delete_version(".", "s", 1, false).await.unwrap();

    assert!(engine.get_versions(".", "s", false).await.unwrap().is_empty());
    assert_eq!(engine.get_versions(".", "s", true).await.unwrap(), vec![1]);

    let (id2, ver2) = engine.register_schema(".", "s", request(body)).await.unwrap();
    assert_eq!(id2, 1);
    assert_eq!(ver2, 2);
}

#[tokio::test]
async fn import_preserves_ids_then_continues_natural_allocation() {
    let engine = engine();
    let items = vec![
        ImportItem {
            id: 10,
            subject: "x".to_string(),
            version: 1,
            request: request(r#"{"type":"string"}"#),
        },
        ImportItem {
            id: 20,
            subject: "y".to_string(),
            version: 1,
            request: request(r#"{"type":"int"}"#),
        },
    ];
    let outcome = engine.import_schemas(".", items).await.unwrap();
    assert_eq!(outcome.imported, 2);
    assert!(outcome.errors.is_empty());

    let (id, version) = engine
        .register_schema(".", "z", request(r#"{"type":"long"}"#))
        .await
        .unwrap();
    assert_eq!(id, 21);
    assert_eq!(version, 1);
}

#[tokio::test]
async fn compatibility_check_against_empty_subject_is_compatible() {
    let engine = engine();
    let report = engine
        .check_compatibility(".", "brand-new", VersionSelector::Latest, request(r#"{"type":"string"}"#))
        .await
        .unwrap();
    assert!(report.is_compatible);
}

#[tokio::test]
async fn version_lookup_on_empty_subject_is_not_found() {
    let engine = engine();
    let err = engine.get_version(".", "never-seen", -1, false).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
