//! `CompatibilityRegistry` and its per-type checkers (spec §4.3): decide
//! whether a candidate schema may replace one or more existing versions
//! under a named compatibility mode.

pub mod avro;
pub mod json;
pub mod protobuf;

use std::collections::HashMap;

use registry_storage::model::{CompatibilityLevel, SchemaType};

use crate::error::{Error, Result};
use crate::schema::ParsedSchema;

/// Result of a single reader/writer check (spec §4.3: "Check(reader,
/// writer) → (isCompatible, messages)").
#[derive(Debug, Clone, Default)]
pub struct CompatibilityReport {
    pub is_compatible: bool,
    pub messages: Vec<String>,
}

impl CompatibilityReport {
    fn ok() -> Self {
        Self {
            is_compatible: true,
            messages: vec![],
        }
    }

    fn fail(messages: Vec<String>) -> Self {
        Self {
            is_compatible: false,
            messages,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.is_compatible &= other.is_compatible;
        self.messages.extend(other.messages);
        self
    }
}

/// One entry per supported [`SchemaType`] (spec §4.3: "For each schema
/// type, a Checker implements Check(reader, writer)").
pub trait CompatibilityChecker: Send + Sync {
    fn schema_type(&self) -> SchemaType;

    /// `reader` must be able to read data written with `writer`'s schema.
    fn check(&self, reader: &ParsedSchema, writer: &ParsedSchema) -> CompatibilityReport;
}

pub struct CompatibilityRegistry {
    checkers: HashMap<SchemaType, Box<dyn CompatibilityChecker>>,
}

impl Default for CompatibilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityRegistry {
    pub fn new() -> Self {
        let mut checkers: HashMap<SchemaType, Box<dyn CompatibilityChecker>> = HashMap::new();
        checkers.insert(SchemaType::Avro, Box::new(avro::AvroChecker));
        checkers.insert(SchemaType::Protobuf, Box::new(protobuf::ProtobufChecker));
        checkers.insert(SchemaType::Json, Box::new(json::JsonSchemaChecker));
        Self { checkers }
    }

    fn checker(&self, schema_type: SchemaType) -> Result<&dyn CompatibilityChecker> {
        self.checkers
            .get(&schema_type)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::Invalid(format!("unsupported schema type: {schema_type}")))
    }

    /// Composes single-pair `Check` calls into the mode-aware semantics of
    /// spec §4.3: `BACKWARD` runs `Check(reader=new, writer=old)`,
    /// `FORWARD` runs `Check(reader=old, writer=new)`, transitive variants
    /// iterate every schema in `existing` rather than only the latest, and
    /// `FULL*` pairs both directions. `existing` must already be ordered
    /// latest-last; non-transitive modes only consult its last element.
    pub fn check(
        &self,
        mode: CompatibilityLevel,
        schema_type: SchemaType,
        candidate: &ParsedSchema,
        existing: &[ParsedSchema],
    ) -> Result<CompatibilityReport> {
        if mode == CompatibilityLevel::None || existing.is_empty() {
            return Ok(CompatibilityReport::ok());
        }
        let checker = self.checker(schema_type)?;

        let targets: Vec<&ParsedSchema> = if mode.is_transitive() {
            existing.iter().collect()
        } else {
            existing.last().into_iter().collect()
        };

        let mut report = CompatibilityReport::ok();
        for target in targets {
            let pair = match mode {
                CompatibilityLevel::None => unreachable!(),
                CompatibilityLevel::Backward | CompatibilityLevel::BackwardTransitive => {
                    checker.check(candidate, target)
                }
                CompatibilityLevel::Forward | CompatibilityLevel::ForwardTransitive => {
                    checker.check(target, candidate)
                }
                CompatibilityLevel::Full | CompatibilityLevel::FullTransitive => checker
                    .check(candidate, target)
                    .merge(checker.check(target, candidate)),
            };
            report = report.merge(pair);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaTypeRegistry, SchemaWithReferences};
    use std::collections::HashMap as Map;

    fn parse(text: &str) -> ParsedSchema {
        let registry = SchemaTypeRegistry::new();
        let (parsed, _, _) = registry
            .parse_and_fingerprint(&SchemaWithReferences {
                schema_type: SchemaType::Avro,
                text: text.to_string(),
                references: vec![],
                resolved: Map::new(),
            })
            .unwrap();
        parsed
    }

    #[test]
    fn none_mode_is_always_compatible() {
        let registry = CompatibilityRegistry::new();
        let old = parse(r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#);
        let new = parse(r#"{"type":"record","name":"R","fields":[]}"#);
        let report = registry
            .check(CompatibilityLevel::None, SchemaType::Avro, &new, &[old])
            .unwrap();
        assert!(report.is_compatible);
    }

    #[test]
    fn empty_history_is_always_compatible() {
        let registry = CompatibilityRegistry::new();
        let new = parse(r#"{"type":"record","name":"R","fields":[]}"#);
        let report = registry
            .check(CompatibilityLevel::Backward, SchemaType::Avro, &new, &[])
            .unwrap();
        assert!(report.is_compatible);
    }
}
