//! `SchemaTypeRegistry` and its per-type parsers (spec §4.2): parse,
//! validate, canonicalize, fingerprint, and resolve named references for
//! each of the three supported schema formats.

pub mod avro;
pub mod json;
pub mod protobuf;

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use registry_storage::model::{Reference, SchemaType};

use crate::error::{Error, Result};

/// The structured result of [`SchemaParser::parse`]. Kept as a type-tagged
/// enum rather than a trait object: each variant's checker and
/// canonicalizer need the type's own concrete shape (the Avro field list,
/// the protobuf message tree, the JSON document), not just opaque text.
#[derive(Debug, Clone)]
pub enum ParsedSchema {
    Avro(serde_json::Value),
    Protobuf(protobuf::ProtoFile),
    Json(serde_json::Value),
}

impl ParsedSchema {
    pub fn schema_type(&self) -> SchemaType {
        match self {
            ParsedSchema::Avro(_) => SchemaType::Avro,
            ParsedSchema::Protobuf(_) => SchemaType::Protobuf,
            ParsedSchema::Json(_) => SchemaType::Json,
        }
    }
}

/// A schema together with its resolved references, the view both parsers
/// and compatibility checkers operate against (spec §4.3: "The Checker
/// receives the same `SchemaWithReferences` view the parsers use").
#[derive(Debug, Clone)]
pub struct SchemaWithReferences {
    pub schema_type: SchemaType,
    pub text: String,
    pub references: Vec<Reference>,
    /// `reference.name -> resolved canonical text`, populated by the
    /// engine before parsing (spec §4.2.1).
    pub resolved: HashMap<String, String>,
}

/// One entry per supported [`SchemaType`] (spec §4.2: "owns per-type
/// parsers ... one entry per supported type").
pub trait SchemaParser: Send + Sync {
    fn schema_type(&self) -> SchemaType;

    /// Validate `schema.text`, resolving named references from
    /// `schema.resolved`. Fails with `Error::Invalid` citing the problem
    /// (missing reference, malformed body, ...).
    fn parse(&self, schema: &SchemaWithReferences) -> Result<ParsedSchema>;

    /// A deterministic, whitespace-/ordering-normalized textual form.
    /// `Canonicalize(Canonicalize(x)) == Canonicalize(x)`.
    fn canonicalize(&self, parsed: &ParsedSchema) -> Result<String>;
}

/// Dispatch table `schemaType -> parser` (spec §9: "a tagged-variant plus
/// table dispatch is preferred over ad-hoc interface hierarchies").
pub struct SchemaTypeRegistry {
    parsers: HashMap<SchemaType, Box<dyn SchemaParser>>,
}

impl Default for SchemaTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaTypeRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<SchemaType, Box<dyn SchemaParser>> = HashMap::new();
        parsers.insert(SchemaType::Avro, Box::new(avro::AvroParser));
        parsers.insert(SchemaType::Protobuf, Box::new(protobuf::ProtobufParser));
        parsers.insert(SchemaType::Json, Box::new(json::JsonSchemaParser));
        Self { parsers }
    }

    pub fn parser(&self, schema_type: SchemaType) -> Result<&dyn SchemaParser> {
        self.parsers
            .get(&schema_type)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::Invalid(format!("unsupported schema type: {schema_type}")))
    }

    /// Parse, canonicalize, and fingerprint in one call — the sequence
    /// every registration and lookup path needs (spec §4.4 step 3).
    pub fn parse_and_fingerprint(
        &self,
        schema: &SchemaWithReferences,
    ) -> Result<(ParsedSchema, String, String)> {
        let parser = self.parser(schema.schema_type)?;
        let parsed = parser.parse(schema)?;
        let canonical = parser.canonicalize(&parsed)?;
        let fp = fingerprint(schema.schema_type, &canonical, &schema.references);
        Ok((parsed, canonical, fp))
    }

    /// Supported types, for `GET /schemas/types`.
    pub fn supported_types(&self) -> Vec<SchemaType> {
        let mut types: Vec<SchemaType> = self.parsers.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }
}

/// `sha2::Sha256` over `schemaType || 0x00 || canonicalText || 0x00 ||
/// sorted(references)` (spec §4.2 point 3), hex-encoded.
pub fn fingerprint(schema_type: SchemaType, canonical: &str, references: &[Reference]) -> String {
    let mut refs: Vec<String> = references
        .iter()
        .map(|r| format!("{}={}/{}", r.name, r.subject, r.version))
        .collect();
    refs.sort();

    let mut hasher = Sha256::new();
    hasher.update(schema_type.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    hasher.update([0u8]);
    hasher.update(refs.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

/// Best-effort fully-qualified name for a parsed schema, exposed as the
/// `schemaIdentity` read convenience on `GET /schemas/ids/{id}` (derived
/// on demand, never stored — SPEC_FULL §3).
pub fn schema_identity(parsed: &ParsedSchema) -> Option<String> {
    match parsed {
        ParsedSchema::Avro(value) => {
            let name = value.get("name")?.as_str()?;
            match value.get("namespace").and_then(|n| n.as_str()) {
                Some(ns) if !ns.is_empty() => Some(format!("{ns}.{name}")),
                _ => Some(name.to_string()),
            }
        }
        ParsedSchema::Protobuf(file) => {
            let first = file.messages.first().map(|m| m.name.as_str())?;
            match &file.package {
                Some(pkg) if !pkg.is_empty() => Some(format!("{pkg}.{first}")),
                _ => Some(first.to_string()),
            }
        }
        ParsedSchema::Json(value) => value
            .get("$id")
            .or_else(|| value.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

/// Sort object keys for deterministic JSON text, stripping documentation
/// keys (Avro's `doc`) that the canonical form doesn't carry. Shared by
/// the Avro and JSON Schema parsers since both canonicalize via
/// `serde_json::Value`; array order (declaration order of e.g. Avro
/// record fields) is always preserved, never resorted.
pub fn canonical_json_value(value: &serde_json::Value, strip_keys: &[&str]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !strip_keys.contains(&k.as_str()))
                .collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonical_json_value(&map[k], strip_keys));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|v| canonical_json_value(v, strip_keys)).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_reference_order() {
        let refs_a = vec![
            Reference { name: "A".into(), subject: "s1".into(), version: 1 },
            Reference { name: "B".into(), subject: "s2".into(), version: 2 },
        ];
        let refs_b = vec![refs_a[1].clone(), refs_a[0].clone()];
        let fp_a = fingerprint(SchemaType::Avro, "x", &refs_a);
        let fp_b = fingerprint(SchemaType::Avro, "x", &refs_b);
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn fingerprint_distinguishes_schema_type() {
        let fp_avro = fingerprint(SchemaType::Avro, "x", &[]);
        let fp_json = fingerprint(SchemaType::Json, "x", &[]);
        assert_ne!(fp_avro, fp_json);
    }

    #[test]
    fn derives_avro_identity_from_namespace_and_name() {
        let registry = SchemaTypeRegistry::new();
        let view = SchemaWithReferences {
            schema_type: SchemaType::Avro,
            text: r#"{"type":"record","name":"Order","namespace":"com.example","fields":[]}"#.to_string(),
            references: vec![],
            resolved: HashMap::new(),
        };
        let (parsed, _, _) = registry.parse_and_fingerprint(&view).unwrap();
        assert_eq!(schema_identity(&parsed).as_deref(), Some("com.example.Order"));
    }
}
