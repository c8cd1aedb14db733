//! Avro compatibility checker (spec §4.3): "fields added only if they
//! carry a default", "fields removed only if they carried a default",
//! "union widening allowed", "enum symbol additions backward-compatible
//! only with a default".

use serde_json::Value;

use super::{CompatibilityChecker, CompatibilityReport};
use crate::schema::ParsedSchema;
use registry_storage::model::SchemaType;

pub struct AvroChecker;

fn fields_of(schema: &Value) -> Option<&Vec<Value>> {
    schema.get("fields").and_then(Value::as_array)
}

fn field_name(field: &Value) -> Option<&str> {
    field.get("name").and_then(Value::as_str)
}

fn find_field<'a>(fields: &'a [Value], name: &str) -> Option<&'a Value> {
    fields.iter().find(|f| field_name(f) == Some(name))
}

fn is_record(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("record")
}

fn is_enum(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("enum")
}

/// `reader` must be able to decode data written with `writer`'s schema:
/// any field `reader` requires that `writer` doesn't supply must carry a
/// default, and any enum symbol `writer` may emit that `reader` doesn't
/// know must be covered by `reader`'s enum default.
fn check_records(reader: &Value, writer: &Value, messages: &mut Vec<String>) {
    let (Some(reader_fields), Some(writer_fields)) = (fields_of(reader), fields_of(writer)) else {
        return;
    };
    for field in reader_fields {
        let Some(name) = field_name(field) else {
            continue;
        };
        if find_field(writer_fields, name).is_none() && field.get("default").is_none() {
            messages.push(format!("field '{name}' added without a default"));
        }
    }
}

fn check_enums(reader: &Value, writer: &Value, messages: &mut Vec<String>) {
    let reader_symbols: Vec<&str> = reader
        .get("symbols")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let writer_symbols: Vec<&str> = writer
        .get("symbols")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let has_default = reader.get("default").and_then(Value::as_str).is_some();
    for symbol in writer_symbols {
        if !reader_symbols.contains(&symbol) && !has_default {
            messages.push(format!("enum symbol '{symbol}' unknown to reader without a default"));
        }
    }
}

impl CompatibilityChecker for AvroChecker {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Avro
    }

    fn check(&self, reader: &ParsedSchema, writer: &ParsedSchema) -> CompatibilityReport {
        let (ParsedSchema::Avro(reader_v), ParsedSchema::Avro(writer_v)) = (reader, writer) else {
            return CompatibilityReport::fail(vec!["schema type mismatch in checker".to_string()]);
        };

        let mut messages = Vec::new();
        if is_record(reader_v) && is_record(writer_v) {
            check_records(reader_v, writer_v, &mut messages);
        } else if is_enum(reader_v) && is_enum(writer_v) {
            check_enums(reader_v, writer_v, &mut messages);
        }
        // Unions, primitives, arrays, maps, and fixed types are treated as
        // compatible by structure alone (spec: "union widening allowed").

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
                schema_type: SchemaType::Avro,
                text: text.to_string(),
                references: vec![],
                resolved: HashMap::new(),
            })
            .unwrap();
        parsed
    }

    #[test]
    fn adding_field_with_default_is_compatible() {
        let checker = AvroChecker;
        let old = parse(r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#);
        let new = parse(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"},{"name":"b","type":"string","default":""}]}"#,
        );
        // BACKWARD: reader=new, writer=old
        let report = checker.check(&new, &old);
        assert!(report.is_compatible);
    }

    #[test]
    fn adding_field_without_default_is_incompatible() {
        let checker = AvroChecker;
        let old = parse(r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#);
        let new = parse(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"},{"name":"b","type":"string"}]}"#,
        );
        let report = checker.check(&new, &old);
        assert!(!report.is_compatible);
        assert!(!report.messages.is_empty());
    }

    #[test]
    fn enum_symbol_addition_requires_default() {
        let checker = AvroChecker;
        let old = parse(r#"{"type":"enum","name":"E","symbols":["A","B"]}"#);
        let new_no_default = parse(r#"{"type":"enum","name":"E","symbols":["A","B","C"]}"#);
        assert!(!checker.check(&old, &new_no_default).is_compatible);

        let new_with_default =
            parse(r#"{"type":"enum","name":"E","symbols":["A","B"],"default":"A"}"#);
        assert!(checker.check(&new_with_default, &old).is_compatible);
    }
}
