//! Protobuf compatibility checker (spec §4.3): "never reuse a field
//! number with a different type; optional/singular fields freely
//! addable/removable; required fields (proto2) are breaking to remove."

use super::{CompatibilityChecker, CompatibilityReport};
use crate::schema::protobuf::{FieldLabel, ProtoField, ProtoMessage};
use crate::schema::ParsedSchema;
use registry_storage::model::SchemaType;

pub struct ProtobufChecker;

fn find_message<'a>(messages: &'a [ProtoMessage], name: &str) -> Option<&'a ProtoMessage> {
    messages.iter().find(|m| m.name == name)
}

fn find_field_by_number(fields: &[ProtoField], number: i32) -> Option<&ProtoField> {
    fields.iter().find(|f| f.number == number)
}

fn check_message(reader: &ProtoMessage, writer: &ProtoMessage, messages: &mut Vec<String>) {
    for field in &writer.fields {
        if let Some(reader_field) = find_field_by_number(&reader.fields, field.number) {
            if reader_field.type_name != field.type_name {
                messages.push(format!(
                    "field number {} reused with a different type ('{}' vs '{}') in message '{}'",
                    field.number, reader_field.type_name, field.type_name, writer.name
                ));
            }
        } else if field.label == FieldLabel::Required {
            messages.push(format!(
                "required field '{}' ({}) removed from message '{}'",
                field.name, field.number, writer.name
            ));
        }
    }

    for nested_writer in &writer.nested_messages {
        if let Some(nested_reader) = find_message(&reader.nested_messages, &nested_writer.name) {
            check_message(nested_reader, nested_writer, messages);
        }
    }
}

impl CompatibilityChecker for ProtobufChecker {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Protobuf
    }

    fn check(&self, reader: &ParsedSchema, writer: &ParsedSchema) -> CompatibilityReport {
        let (ParsedSchema::Protobuf(reader_file), ParsedSchema::Protobuf(writer_file)) =
            (reader, writer)
        else {
            return CompatibilityReport::fail(vec!["schema type mismatch in checker".to_string()]);
        };

        let mut messages = Vec::new();
        for writer_message in &writer_file.messages {
            if let Some(reader_message) = find_message(&reader_file.messages, &writer_message.name)
            {
                check_message(reader_message, writer_message, &mut messages);
            }
        }

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
                schema_type: SchemaType::Protobuf,
                text: text.to_string(),
                references: vec![],
                resolved: HashMap::new(),
            })
            .unwrap();
        parsed
    }

    #[test]
    fn adding_and_removing_optional_fields_is_compatible() {
        let checker = ProtobufChecker;
        let old = parse("syntax=\"proto3\"; message M { int32 a = 1; string b = 2; }");
        let new = parse("syntax=\"proto3\"; message M { int32 a = 1; bool c = 3; }");
        assert!(checker.check(&new, &old).is_compatible);
    }

    #[test]
    fn reusing_field_number_with_different_type_is_incompatible() {
        let checker = ProtobufChecker;
        let old = parse("syntax=\"proto3\"; message M { int32 a = 1; }");
        let new = parse("syntax=\"proto3\"; message M { string a = 1; }");
        let report = checker.check(&new, &old);
        assert!(!report.is_compatible);
    }

    #[test]
    fn removing_required_field_is_incompatible() {
        let checker = ProtobufChecker;
        let old = parse("syntax=\"proto2\"; message M { required int32 a = 1; }");
        let new = parse("syntax=\"proto2\"; message M {}");
        let report = checker.check(&new, &old);
        assert!(!report.is_compatible);
    }
}
