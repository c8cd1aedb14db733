//! The conformance suite every backend must pass identically (spec §4.1:
//! "Every backend ... must pass an identical conformance suite"). Written
//! against `Arc<dyn RegistryStorage>` so a future backend only needs to
//! plug its constructor into [`run_conformance_suite`] to be checked
//! against the same invariants `MemoryStorage` is.

use std::sync::Arc;

use crate::model::{CreateOutcome, ImportedSchema, ModeRecord, Mode, NewSchema, SchemaType};
use crate::traits::RegistryStorage;
use crate::MemoryStorage;

fn schema(body: &str) -> NewSchema {
    NewSchema {
        schema_type: SchemaType::Avro,
        schema: body.to_string(),
        references: vec![],
        fingerprint: format!("fp:{body}"),
        metadata: None,
        rule_set: None,
    }
}

/// Runs every conformance check against the given backend constructor.
/// Each check gets a fresh instance so they don't interfere.
async fn run_conformance_suite<F>(make: F)
where
    F: Fn() -> Arc<dyn RegistryStorage>,
{
    // Invariant 1: version monotonicity survives interleaved deletes.
    {
        let storage = make();
        for body in ["a", "b", "c"] {
            storage.create_schema(".", "s", schema(body)).await.unwrap();
        }
        storage.delete_schema(".", "s", 2, false).await.unwrap();
        let outcome = storage.create_schema(".", "s", schema("d")).await.unwrap();
        assert_eq!(outcome.version(), 4, "version numbers must never be reused");
    }

    // Invariant 2: per-subject fingerprint uniqueness.
    {
        let storage = make();
        storage.create_schema(".", "s", schema("x")).await.unwrap();
        let outcome = storage.create_schema(".", "s", schema("x")).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::AlreadyExists { .. }));
    }

    // Invariant 3: per-context id stability across subjects.
    {
        let storage = make();
        let a = storage.create_schema(".", "s1", schema("shared")).await.unwrap();
        let b = storage.create_schema(".", "s2", schema("shared")).await.unwrap();
        assert_eq!(a.id(), b.id());
    }

    // Invariant 5: natural ids never collide with imported ones.
    {
        let storage = make();
        storage
            .import_schema(
                ".",
                ImportedSchema {
                    id: 100,
                    subject: "s".to_string(),
                    version: 1,
                    new: schema("imported"),
                },
            )
            .await
            .unwrap();
        storage.set_next_id(".", 101).await.unwrap();
        let next = storage.next_id(".").await.unwrap();
        assert!(next > 100);
    }

    // Invariant 6: context isolation.
    {
        let storage = make();
        storage.create_schema(".", "s", schema("a")).await.unwrap();
        assert!(storage.list_subjects(".other", false).await.unwrap().is_empty());
    }

    // Invariant 7: delete soundness + schema row gc.
    {
        let storage = make();
        let outcome = storage.create_schema(".", "s", schema("x")).await.unwrap();
        let id = outcome.id();
        let err = storage.delete_schema(".", "s", 1, true).await.unwrap_err();
        assert!(err.to_string().contains("not soft-deleted") || format!("{err:?}").contains("NotSoftDeleted"));
        storage.delete_schema(".", "s", 1, false).await.unwrap();
        storage.delete_schema(".", "s", 1, true).await.unwrap();
        assert!(storage.get_schema_by_id(".", id).await.is_err());
    }

    // Boundary: version -1 on an empty subject is VersionNotFound via
    // SubjectNotFound (no versions recorded yet).
    {
        let storage = make();
        assert!(storage
            .get_schema_by_subject_version(".", "ghost", -1, false)
            .await
            .is_err());
    }

    // Mode/config default to None until explicitly set, scoped per
    // context, and do not leak between contexts.
    {
        let storage = make();
        assert!(storage.get_global_mode(".").await.unwrap().is_none());
        storage
            .set_global_mode(".", ModeRecord { mode: Mode::ReadOnly })
            .await
            .unwrap();
        assert!(storage.get_global_mode(".prod").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn memory_storage_passes_conformance_suite() {
    run_conformance_suite(|| Arc::new(MemoryStorage::new()) as Arc<dyn RegistryStorage>).await;
}
