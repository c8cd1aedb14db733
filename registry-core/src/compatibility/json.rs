//! JSON Schema compatibility checker (spec §4.3): "adding an optional
//! property is backward-compatible; tightening a type or making a
//! property required is breaking."

use serde_json::Value;

use super::{CompatibilityChecker, CompatibilityReport};
use crate::schema::ParsedSchema;
use registry_storage::model::SchemaType;

pub struct JsonSchemaChecker;

fn properties_of(schema: &Value) -> Option<&serde_json::Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

fn required_of(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn type_of(schema: &Value) -> Option<&Value> {
    schema.get("type")
}

/// `reader` must accept any document `writer` would have accepted: a
/// property `writer` declared with a different `type` than `reader` is a
/// tightened/loosened constraint (breaking either way, conservatively
/// flagged), and any property `reader` requires that `writer` didn't
/// require is a new requirement old documents may not satisfy.
fn check_object_shape(reader: &Value, writer: &Value, messages: &mut Vec<String>) {
    let reader_props = properties_of(reader);
    let writer_props = properties_of(writer);
    let reader_required = required_of(reader);
    let writer_required = required_of(writer);

    if let (Some(reader_props), Some(writer_props)) = (reader_props, writer_props) {
        for (name, writer_schema) in writer_props {
            if let Some(reader_schema) = reader_props.get(name) {
                let (rt, wt) = (type_of(reader_schema), type_of(writer_schema));
                if rt.is_some() && wt.is_some() && rt != wt {
                    messages.push(format!("property '{name}' type tightened from {wt:?} to {rt:?}"));
                }
            }
        }
    }

    for name in &reader_required {
        if !writer_required.contains(name) {
            messages.push(format!("property '{name}' made required"));
        }
    }
}

impl CompatibilityChecker for JsonSchemaChecker {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Json
    }

    fn check(&self, reader: &ParsedSchema, writer: &ParsedSchema) -> CompatibilityReport {
        let (ParsedSchema::Json(reader_v), ParsedSchema::Json(writer_v)) = (reader, writer) else {
            return CompatibilityReport::fail(vec!["schema type mismatch in checker".to_string()]);
        };

        let mut messages = Vec::new();
        check_object_shape(reader_v, writer_v, &mut messages);

        if messages.is_empty() {
            CompatibilityReport::ok()
        } else {
            CompatibilityReport::fail(messages)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaTypeRegistry;
    use crate::schema::SchemaWithReferences;
    use std::collections::HashMap;

    fn parse(text: &str) -> ParsedSchema {
        let registry = SchemaTypeRegistry::new();
        let (parsed, _, _) = registry
            .parse_and_fingerprint(&SchemaWithReferences {
                schema_type: SchemaType::Json,
                text: text.to_string(),
                references: vec![],
                resolved: HashMap::new(),
            })
            .unwrap();
        parsed
    }

    #[test]
    fn adding_optional_property_is_compatible() {
        let checker = JsonSchemaChecker;
        let old = parse(r#"{"type":"object","properties":{"a":{"type":"string"}}}"#);
        let new =
            parse(r#"{"type":"object","properties":{"a":{"type":"string"},"b":{"type":"string"}}}"#);
        assert!(checker.check(&new, &old).is_compatible);
    }

    #[test]
    fn making_property_required_is_incompatible() {
        let checker = JsonSchemaChecker;
        let old = parse(r#"{"type":"object","properties":{"a":{"type":"string"}}}"#);
        let new = parse(
            r#"{"type":"object","properties":{"a":{"type":"string"}},"required":["a"]}"#,
        );
        assert!(!checker.check(&new, &old).is_compatible);
    }

    #[test]
    fn tightening_type_is_incompatible() {
        let checker = JsonSchemaChecker;
        let old = parse(r#"{"type":"object","properties":{"a":{"type":"string"}}}"#);
        let new = parse(r#"{"type":"object","properties":{"a":{"type":"integer"}}}"#);
        assert!(!checker.check(&new, &old).is_compatible);
    }
}
