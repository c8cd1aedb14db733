//! Backend selection (spec §6.4, §9 "pluggable storage"): a `storage.type`
//! configuration value maps to a concrete [`crate::RegistryStorage`]
//! without any other layer branching on backend identity.
//!
//! `memory` is the only backend this crate implements end to end.
//! `postgres`/`mysql`/`cassandra` are recognized names — a deployment can
//! select them in configuration and the factory will name the gap
//! plainly via `StorageError::NotSupported` — but no driver crate backs
//! them here (see repository `DESIGN.md`: fabricating a stub dependency
//! would be worse than stating this honestly).

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::memory::MemoryStorage;
use crate::traits::RegistryStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Postgres,
    Mysql,
    Cassandra,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("memory") => Ok(StorageKind::Memory),
            s if s.eq_ignore_ascii_case("postgres") => Ok(StorageKind::Postgres),
            s if s.eq_ignore_ascii_case("mysql") => Ok(StorageKind::Mysql),
            s if s.eq_ignore_ascii_case("cassandra") => Ok(StorageKind::Cassandra),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

impl StorageKind {
    fn name(&self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::Postgres => "postgres",
            StorageKind::Mysql => "mysql",
            StorageKind::Cassandra => "cassandra",
        }
    }
}

/// Connection parameters a configuration layer hands to the factory.
/// `connection` is an opaque DSN, unused by `memory`.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    pub connection: Option<String>,
}

/// Build the configured backend. Never branches the caller on backend
/// type: every `Arc<dyn RegistryStorage>` this returns is used identically
/// by the engine.
pub fn create(kind: StorageKind, _settings: &StorageSettings) -> Result<Arc<dyn RegistryStorage>> {
    match kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        other => Err(StorageError::NotSupported(other.name().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_constructs() {
        let storage = create(StorageKind::Memory, &StorageSettings::default()).unwrap();
        drop(storage);
    }

    #[test]
    fn unimplemented_backends_report_not_supported() {
        let err = create(StorageKind::Postgres, &StorageSettings::default()).unwrap_err();
        assert!(matches!(err, StorageError::NotSupported(_)));
    }

    #[test]
    fn parses_backend_names_case_insensitively() {
        assert_eq!("MEMORY".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("oracle".parse::<StorageKind>().is_err());
    }
}
