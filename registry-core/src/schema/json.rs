//! JSON Schema parser (spec §4.2.2): validates that the document is a
//! well-formed JSON Schema (object or boolean root, internal `$ref`
//! pointers resolvable) and canonicalizes by key-sorting, the same
//! approach the Avro parser uses since both operate over
//! `serde_json::Value`.

use crate::error::{Error, Result};
use crate::schema::{canonical_json_value, ParsedSchema, SchemaParser, SchemaWithReferences};
use registry_storage::model::SchemaType;

pub struct JsonSchemaParser;

/// Walks a JSON Schema document validating every `$ref`: external
/// references (anything not starting with `#`) must name a resolved
/// reference; internal ones must resolve as a `/`-separated path from
/// the document root.
fn validate_refs(root: &serde_json::Value, node: &serde_json::Value, resolved: &std::collections::HashMap<String, String>) -> Result<()> {
    match node {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(r)) = map.get("$ref") {
                if let Some(local) = r.strip_prefix('#') {
                    if !local.is_empty() {
                        resolve_pointer(root, local)?;
                    }
                } else if !resolved.contains_key(r.as_str()) {
                    return Err(Error::Invalid(format!("unresolved $ref: {r}")));
                }
            }
            for v in map.values() {
                validate_refs(root, v, resolved)?;
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                validate_refs(root, v, resolved)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn resolve_pointer<'a>(root: &'a serde_json::Value, pointer: &str) -> Result<&'a serde_json::Value> {
    let pointer = pointer.strip_prefix('/').unwrap_or(pointer);
    let mut current = root;
    for segment in pointer.split('/') {
        if segment.is_empty() {
            continue;
        }
        let segment = segment.replace("~1", "/").replace("~0", "~");
        current = match current {
            serde_json::Value::Object(map) => map
                .get(&segment)
                .ok_or_else(|| Error::Invalid(format!("unresolved internal $ref segment: {segment}")))?,
            serde_json::Value::Array(items) => {
                let idx: usize = segment
                    .parse()
                    .map_err(|_| Error::Invalid(format!("invalid array index in $ref: {segment}")))?;
                items
                    .get(idx)
                    .ok_or_else(|| Error::Invalid(format!("$ref array index out of bounds: {idx}")))?
            }
            _ => return Err(Error::Invalid(format!("cannot descend into $ref segment: {segment}"))),
        };
    }
    Ok(current)
}

impl SchemaParser for JsonSchemaParser {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Json
    }

    fn parse(&self, schema: &SchemaWithReferences) -> Result<ParsedSchema> {
        let value: serde_json::Value = serde_json::from_str(&schema.text)
            .map_err(|e| Error::Invalid(format!("invalid json schema: {e}")))?;

        match &value {
            serde_json::Value::Object(_) | serde_json::Value::Bool(_) => {}
            _ => return Err(Error::Invalid("json schema root must be an object or boolean".into())),
        }

        validate_refs(&value, &value, &schema.resolved)?;

        Ok(ParsedSchema::Json(value))
    }

    fn canonicalize(&self, parsed: &ParsedSchema) -> Result<String> {
        let value = match parsed {
            ParsedSchema::Json(v) => v,
            _ => return Err(Error::Invalid("expected a json schema parsed schema".into())),
        };
        let canonical = canonical_json_value(value, &[]);
        serde_json::to_string(&canonical)
            .map_err(|e| Error::Invalid(format!("failed to serialize canonical json schema: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn schema(text: &str) -> SchemaWithReferences {
        SchemaWithReferences {
            schema_type: SchemaType::Json,
            text: text.to_string(),
            references: vec![],
            resolved: HashMap::new(),
        }
    }

    #[test]
    fn parses_plain_object_schema() {
        let parser = JsonSchemaParser;
        let parsed = parser
            .parse(&schema(r#"{"type":"object","properties":{"id":{"type":"integer"}}}"#))
            .unwrap();
        assert!(parser.canonicalize(&parsed).is_ok());
    }

    #[test]
    fn resolves_internal_defs_ref() {
        let parser = JsonSchemaParser;
        let text = r#"{
            "type": "object",
            "properties": { "amount": { "$ref": "#/$defs/Money" } },
            "$defs": { "Money": { "type": "number" } }
        }"#;
        assert!(parser.parse(&schema(text)).is_ok());
    }

    #[test]
    fn rejects_dangling_internal_ref() {
        let parser = JsonSchemaParser;
        let text = r#"{"properties": {"x": {"$ref": "#/$defs/Missing"}}}"#;
        assert!(parser.parse(&schema(text)).is_err());
    }

    #[test]
    fn external_ref_requires_resolved_reference() {
        let parser = JsonSchemaParser;
        let text = r#"{"properties": {"x": {"$ref": "common.json"}}}"#;
        assert!(parser.parse(&schema(text)).is_err());

        let mut resolved = HashMap::new();
        resolved.insert("common.json".to_string(), r#"{"type":"string"}"#.to_string());
        let s = SchemaWithReferences {
            schema_type: SchemaType::Json,
            text: text.to_string(),
            references: vec![],
            resolved,
        };
        assert!(parser.parse(&s).is_ok());
    }

    #[test]
    fn canonicalize_sorts_keys_and_is_idempotent() {
        let parser = JsonSchemaParser;
        let text = r#"{"type":"object","properties":{"b":{"type":"string"},"a":{"type":"string"}}}"#;
        let parsed = parser.parse(&schema(text)).unwrap();
        let once = parser.canonicalize(&parsed).unwrap();
        let reparsed = parser.parse(&schema(&once)).unwrap();
        let twice = parser.canonicalize(&reparsed).unwrap();
        assert_eq!(once, twice);
        assert!(once.find("\"a\"").unwrap() < once.find("\"b\"").unwrap());
    }

    #[test]
    fn boolean_schema_is_valid() {
        let parser = JsonSchemaParser;
        assert!(parser.parse(&schema("true")).is_ok());
    }
}
