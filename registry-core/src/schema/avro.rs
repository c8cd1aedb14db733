//! Avro parser (spec §4.2.2): primitives, `record`, `enum`, `array`,
//! `map`, `union`, `fixed`, and logical types.
//!
//! Structural validation is delegated to `apache_avro`, which already
//! understands named-type cross-references when handed the referenced
//! schemas alongside the target (`Schema::parse_list`); canonicalization
//! is hand-rolled over the parsed `serde_json::Value` rather than
//! `apache_avro`'s own schema struct, since Confluent's canonical form
//! (field order preserved, docs stripped, defaults normalized) is a
//! specific variant that the library's own normalization doesn't
//! reproduce exactly.

use apache_avro::Schema as AvroSchema;

use crate::error::{Error, Result};
use crate::schema::{canonical_json_value, ParsedSchema, SchemaParser, SchemaWithReferences};
use registry_storage::model::SchemaType;

pub struct AvroParser;

impl SchemaParser for AvroParser {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Avro
    }

    fn parse(&self, schema: &SchemaWithReferences) -> Result<ParsedSchema> {
        let value: serde_json::Value = serde_json::from_str(&schema.text)
            .map_err(|e| Error::Invalid(format!("invalid avro schema json: {e}")))?;

        // Validate structurally, resolving named types from references by
        // parsing the whole dependency set together: apache_avro resolves
        // forward/backward references across a `parse_list` call the same
        // way Confluent resolves named Avro types across subjects.
        let mut dependents: Vec<&str> = schema.resolved.values().map(|s| s.as_str()).collect();
        dependents.push(schema.text.as_str());
        AvroSchema::parse_list(&dependents)
            .map_err(|e| Error::Invalid(format!("invalid avro schema: {e}")))?;

        Ok(ParsedSchema::Avro(value))
    }

    fn canonicalize(&self, parsed: &ParsedSchema) -> Result<String> {
        let value = match parsed {
            ParsedSchema::Avro(v) => v,
            _ => return Err(Error::Invalid("expected an Avro parsed schema".into())),
        };
        let canonical = canonical_json_value(value, &["doc"]);
        serde_json::to_string(&canonical)
            .map_err(|e| Error::Invalid(format!("failed to serialize canonical avro: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn schema(text: &str) -> SchemaWithReferences {
        SchemaWithReferences {
            schema_type: SchemaType::Avro,
            text: text.to_string(),
            references: vec![],
            resolved: HashMap::new(),
        }
    }

    #[test]
    fn parses_primitive_type() {
        let parser = AvroParser;
        let parsed = parser.parse(&schema(r#"{"type":"string"}"#)).unwrap();
        assert!(parser.canonicalize(&parsed).is_ok());
    }

    #[test]
    fn parses_record_with_fields() {
        let parser = AvroParser;
        let text = r#"{"type":"record","name":"Order","fields":[
            {"name":"id","type":"long"},
            {"name":"name","type":"string","doc":"customer name"}
        ]}"#;
        let parsed = parser.parse(&schema(text)).unwrap();
        let canonical = parser.canonicalize(&parsed).unwrap();
        assert!(!canonical.contains("doc"));
        // declaration order preserved, not sorted alphabetically
        assert!(canonical.find("\"id\"").unwrap() < canonical.find("\"name\":\"name\"").unwrap());
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let parser = AvroParser;
        let text = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#;
        let parsed = parser.parse(&schema(text)).unwrap();
        let once = parser.canonicalize(&parsed).unwrap();
        let reparsed = parser.parse(&schema(&once)).unwrap();
        let twice = parser.canonicalize(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_malformed_schema() {
        let parser = AvroParser;
        assert!(parser.parse(&schema(r#"{"type": "not-a-real-type"}"#)).is_err());
    }

    #[test]
    fn resolves_named_type_from_reference() {
        let parser = AvroParser;
        let mut resolved = HashMap::new();
        resolved.insert(
            "common.Money".to_string(),
            r#"{"type":"record","name":"Money","namespace":"common","fields":[{"name":"cents","type":"long"}]}"#.to_string(),
        );
        let s = SchemaWithReferences {
            schema_type: SchemaType::Avro,
            text: r#"{"type":"record","name":"Order","fields":[{"name":"price","type":"common.Money"}]}"#.to_string(),
            references: vec![],
            resolved,
        };
        assert!(parser.parse(&s).is_ok());
    }
}
