//! Protobuf parser (spec §4.2.2): a focused hand-rolled structural parser
//! covering `proto2`/`proto3` syntax, field numbers, `oneof`, `map<K,V>`,
//! nested messages, `repeated`/`optional`, and services (including
//! streaming declarations). No codegen crate is used — schemas are never
//! compiled or executed here, only compared structurally, so a full
//! grammar would be scope the engine doesn't need (see `DESIGN.md`).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::{ParsedSchema, SchemaParser, SchemaWithReferences};
use registry_storage::model::SchemaType;

#[derive(Debug, Clone, Default)]
pub struct ProtoFile {
    pub syntax: String,
    pub package: Option<String>,
    pub imports: Vec<String>,
    pub messages: Vec<ProtoMessage>,
    pub enums: Vec<ProtoEnum>,
    pub services: Vec<ProtoService>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoMessage {
    pub name: String,
    pub fields: Vec<ProtoField>,
    pub oneofs: Vec<ProtoOneof>,
    pub nested_messages: Vec<ProtoMessage>,
    pub nested_enums: Vec<ProtoEnum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLabel {
    Singular,
    Optional,
    Repeated,
    Required,
}

#[derive(Debug, Clone)]
pub struct ProtoField {
    pub label: FieldLabel,
    pub type_name: String,
    pub map_key_type: Option<String>,
    pub name: String,
    pub number: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoOneof {
    pub name: String,
    pub fields: Vec<ProtoField>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoEnum {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoService {
    pub name: String,
    pub rpcs: Vec<ProtoRpc>,
}

#[derive(Debug, Clone)]
pub struct ProtoRpc {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

/// Strip `//` and `/* */` comments without disturbing string literals
/// (import paths are the only string literals this grammar subset has).
fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Tokenize into whitespace/punctuation-separated units, keeping
/// quoted strings intact.
fn tokenize(src: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut s = String::from("\"");
            for c in chars.by_ref() {
                s.push(c);
                if c == '"' {
                    break;
                }
            }
            tokens.push(s);
        } else if "{}();=<>,".contains(c) {
            chars.next();
            tokens.push(c.to_string());
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || "{}();=<>,".contains(c) || c == '"' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            tokens.push(s);
        }
    }
    tokens
}

struct TokenStream {
    tokens: Vec<String>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }

    fn next(&mut self) -> Result<String> {
        let t = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| Error::Invalid("unexpected end of protobuf schema".into()))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, expected: &str) -> Result<()> {
        let t = self.next()?;
        if t != expected {
            return Err(Error::Invalid(format!(
                "expected '{expected}' but found '{t}' in protobuf schema"
            )));
        }
        Ok(())
    }
}

fn parse_field_number(tok: &str) -> Result<i32> {
    tok.parse()
        .map_err(|_| Error::Invalid(format!("invalid field number: {tok}")))
}

fn parse_field(ts: &mut TokenStream) -> Result<ProtoField> {
    let mut label = FieldLabel::Singular;
    let mut first = ts.next()?;
    match first.as_str() {
        "repeated" => {
            label = FieldLabel::Repeated;
            first = ts.next()?;
        }
        "optional" => {
            label = FieldLabel::Optional;
            first = ts.next()?;
        }
        "required" => {
            label = FieldLabel::Required;
            first = ts.next()?;
        }
        _ => {}
    }

    let mut map_key_type = None;
    let type_name = if first == "map" {
        ts.expect("<")?;
        let key = ts.next()?;
        ts.expect(",")?;
        let value = ts.next()?;
        ts.expect(">")?;
        map_key_type = Some(key);
        value
    } else {
        first
    };

    let name = ts.next()?;
    ts.expect("=")?;
    let number = parse_field_number(&ts.next()?)?;
    // Skip field options `[...]` if present, up to the terminating `;`.
    loop {
        match ts.next()?.as_str() {
            ";" => break,
            "[" => {
                let mut depth = 1;
                while depth > 0 {
                    match ts.next()?.as_str() {
                        "[" => depth += 1,
                        "]" => depth -= 1,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(ProtoField {
        label,
        type_name,
        map_key_type,
        name,
        number,
    })
}

fn parse_oneof(ts: &mut TokenStream) -> Result<ProtoOneof> {
    let name = ts.next()?;
    ts.expect("{")?;
    let mut fields = Vec::new();
    while ts.peek() != Some("}") {
        fields.push(parse_field(ts)?);
    }
    ts.expect("}")?;
    Ok(ProtoOneof { name, fields })
}

fn parse_enum(ts: &mut TokenStream) -> Result<ProtoEnum> {
    let name = ts.next()?;
    ts.expect("{")?;
    let mut values = Vec::new();
    while ts.peek() != Some("}") {
        let vname = ts.next()?;
        ts.expect("=")?;
        let num_tok = ts.next()?;
        let num: i32 = num_tok
            .parse()
            .map_err(|_| Error::Invalid(format!("invalid enum value number: {num_tok}")))?;
        loop {
            match ts.next()?.as_str() {
                ";" => break,
                "[" => {
                    let mut depth = 1;
                    while depth > 0 {
                        match ts.next()?.as_str() {
                            "[" => depth += 1,
                            "]" => depth -= 1,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        values.push((vname, num));
    }
    ts.expect("}")?;
    Ok(ProtoEnum { name, values })
}

fn parse_message(ts: &mut TokenStream) -> Result<ProtoMessage> {
    let name = ts.next()?;
    ts.expect("{")?;
    let mut msg = ProtoMessage {
        name,
        ..Default::default()
    };
    while ts.peek() != Some("}") {
        match ts.peek() {
            Some("message") => {
                ts.next()?;
                msg.nested_messages.push(parse_message(ts)?);
            }
            Some("enum") => {
                ts.next()?;
                msg.nested_enums.push(parse_enum(ts)?);
            }
            Some("oneof") => {
                ts.next()?;
                msg.oneofs.push(parse_oneof(ts)?);
            }
            Some("reserved") | Some("extensions") | Some("option") => {
                while ts.next()? != ";" {}
            }
            _ => {
                msg.fields.push(parse_field(ts)?);
            }
        }
    }
    ts.expect("}")?;
    Ok(msg)
}

fn parse_service(ts: &mut TokenStream) -> Result<ProtoService> {
    let name = ts.next()?;
    ts.expect("{")?;
    let mut rpcs = Vec::new();
    while ts.peek() != Some("}") {
        match ts.peek() {
            Some("option") => {
                while ts.next()? != ";" {}
                continue;
            }
            Some("rpc") => {
                ts.next()?;
            }
            _ => {
                return Err(Error::Invalid("expected 'rpc' in service body".into()));
            }
        }
        let rpc_name = ts.next()?;
        ts.expect("(")?;
        let mut client_streaming = false;
        if ts.peek() == Some("stream") {
            ts.next()?;
            client_streaming = true;
        }
        let input_type = ts.next()?;
        ts.expect(")")?;
        ts.expect("returns")?;
        ts.expect("(")?;
        let mut server_streaming = false;
        if ts.peek() == Some("stream") {
            ts.next()?;
            server_streaming = true;
        }
        let output_type = ts.next()?;
        ts.expect(")")?;
        match ts.peek() {
            Some(";") => {
                ts.next()?;
            }
            Some("{") => {
                ts.next()?;
                let mut depth = 1;
                while depth > 0 {
                    match ts.next()?.as_str() {
                        "{" => depth += 1,
                        "}" => depth -= 1,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        rpcs.push(ProtoRpc {
            name: rpc_name,
            input_type,
            output_type,
            client_streaming,
            server_streaming,
        });
    }
    ts.expect("}")?;
    Ok(ProtoService { name, rpcs })
}

fn parse_file(text: &str) -> Result<ProtoFile> {
    let cleaned = strip_comments(text);
    let tokens = tokenize(&cleaned);
    let mut ts = TokenStream { tokens, pos: 0 };
    let mut file = ProtoFile {
        syntax: "proto2".to_string(),
        ..Default::default()
    };

    while ts.peek().is_some() {
        match ts.next()?.as_str() {
            "syntax" => {
                ts.expect("=")?;
                let s = ts.next()?;
                file.syntax = s.trim_matches('"').to_string();
                ts.expect(";")?;
            }
            "package" => {
                let p = ts.next()?;
                file.package = Some(p);
                ts.expect(";")?;
            }
            "import" => {
                if ts.peek() == Some("public") || ts.peek() == Some("weak") {
                    ts.next()?;
                }
                let path = ts.next()?;
                file.imports.push(path.trim_matches('"').to_string());
                ts.expect(";")?;
            }
            "option" => {
                while ts.next()? != ";" {}
            }
            "message" => file.messages.push(parse_message(&mut ts)?),
            "enum" => file.enums.push(parse_enum(&mut ts)?),
            "service" => file.services.push(parse_service(&mut ts)?),
            ";" => {}
            other => {
                return Err(Error::Invalid(format!(
                    "unexpected top-level token in protobuf schema: {other}"
                )))
            }
        }
    }

    if file.syntax != "proto2" && file.syntax != "proto3" {
        return Err(Error::Invalid(format!(
            "unsupported protobuf syntax: {}",
            file.syntax
        )));
    }

    Ok(file)
}

/// `google/protobuf/*.proto` well-known imports ship with every protobuf
/// toolchain and are implicitly available, never requiring a resolved
/// cross-subject reference.
fn is_well_known(import_path: &str) -> bool {
    import_path.starts_with("google/protobuf/")
}

fn validate_imports(file: &ProtoFile, resolved: &HashMap<String, String>) -> Result<()> {
    for import in &file.imports {
        if is_well_known(import) {
            continue;
        }
        if !resolved.contains_key(import) {
            return Err(Error::Invalid(format!(
                "missing import reference: {import}"
            )));
        }
    }
    Ok(())
}

pub struct ProtobufParser;

impl SchemaParser for ProtobufParser {
    fn schema_type(&self) -> SchemaType {
        SchemaType::Protobuf
    }

    fn parse(&self, schema: &SchemaWithReferences) -> Result<ParsedSchema> {
        let file = parse_file(&schema.text)?;
        validate_imports(&file, &schema.resolved)?;
        Ok(ParsedSchema::Protobuf(file))
    }

    fn canonicalize(&self, parsed: &ParsedSchema) -> Result<String> {
        let file = match parsed {
            ParsedSchema::Protobuf(f) => f,
            _ => return Err(Error::Invalid("expected a protobuf parsed schema".into())),
        };
        Ok(render_canonical(file))
    }
}

fn render_field(f: &ProtoField, indent: &str, out: &mut String) {
    let label = match f.label {
        FieldLabel::Singular => "",
        FieldLabel::Optional => "optional ",
        FieldLabel::Repeated => "repeated ",
        FieldLabel::Required => "required ",
    };
    let type_repr = if let Some(key) = &f.map_key_type {
        format!("map<{key},{}>", f.type_name)
    } else {
        f.type_name.clone()
    };
    out.push_str(&format!(
        "{indent}{label}{type_repr} {}={};\n",
        f.name, f.number
    ));
}

fn render_enum(e: &ProtoEnum, indent: &str, out: &mut String) {
    out.push_str(&format!("{indent}enum {}{{\n", e.name));
    for (name, num) in &e.values {
        out.push_str(&format!("{indent} {name}={num};\n"));
    }
    out.push_str(&format!("{indent}}}\n"));
}

fn render_message(m: &ProtoMessage, indent: &str, out: &mut String) {
    out.push_str(&format!("{indent}message {}{{\n", m.name));
    let inner = format!("{indent} ");
    for f in &m.fields {
        render_field(f, &inner, out);
    }
    for o in &m.oneofs {
        out.push_str(&format!("{inner}oneof {}{{\n", o.name));
        for f in &o.fields {
            render_field(f, &format!("{inner} "), out);
        }
        out.push_str(&format!("{inner}}}\n"));
    }
    for e in &m.nested_enums {
        render_enum(e, &inner, out);
    }
    for nm in &m.nested_messages {
        render_message(nm, &inner, out);
    }
    out.push_str(&format!("{indent}}}\n"));
}

fn render_canonical(file: &ProtoFile) -> String {
    let mut out = String::new();
    out.push_str(&format!("syntax={};\n", file.syntax));
    if let Some(pkg) = &file.package {
        out.push_str(&format!("package {pkg};\n"));
    }
    for import in &file.imports {
        out.push_str(&format!("import\"{import}\";\n"));
    }
    for e in &file.enums {
        render_enum(e, "", &mut out);
    }
    for m in &file.messages {
        render_message(m, "", &mut out);
    }
    for s in &file.services {
        out.push_str(&format!("service {}{{\n", s.name));
        for rpc in &s.rpcs {
            let cs = if rpc.client_streaming { "stream " } else { "" };
            let ss = if rpc.server_streaming { "stream " } else { "" };
            out.push_str(&format!(
                " rpc {}({}{})returns({}{});\n",
                rpc.name, cs, rpc.input_type, ss, rpc.output_type
            ));
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(text: &str) -> SchemaWithReferences {
        SchemaWithReferences {
            schema_type: SchemaType::Protobuf,
            text: text.to_string(),
            references: vec![],
            resolved: HashMap::new(),
        }
    }

    #[test]
    fn parses_proto3_message() {
        let parser = ProtobufParser;
        let text = r#"
            syntax = "proto3";
            message Order {
                int64 id = 1;
                string name = 2;
                repeated string tags = 3;
            }
        "#;
        let parsed = parser.parse(&schema(text)).unwrap();
        let canonical = parser.canonicalize(&parsed).unwrap();
        assert!(canonical.contains("id=1"));
        assert!(canonical.contains("repeated string tags=3"));
    }

    #[test]
    fn parses_oneof_and_map_and_nested_message() {
        let parser = ProtobufParser;
        let text = r#"
            syntax = "proto3";
            message Event {
                map<string, string> attributes = 1;
                oneof payload {
                    string text = 2;
                    int32 code = 3;
                }
                message Inner {
                    bool flag = 1;
                }
            }
        "#;
        let parsed = parser.parse(&schema(text)).unwrap();
        match &parsed {
            ParsedSchema::Protobuf(f) => {
                let msg = &f.messages[0];
                assert_eq!(msg.fields[0].map_key_type.as_deref(), Some("string"));
                assert_eq!(msg.oneofs[0].fields.len(), 2);
                assert_eq!(msg.nested_messages[0].name, "Inner");
            }
            _ => panic!("expected protobuf"),
        }
    }

    #[test]
    fn parses_service_with_streaming() {
        let parser = ProtobufParser;
        let text = r#"
            syntax = "proto3";
            message Req {}
            message Resp {}
            service Streamer {
                rpc Tail(Req) returns (stream Resp);
            }
        "#;
        let parsed = parser.parse(&schema(text)).unwrap();
        match &parsed {
            ParsedSchema::Protobuf(f) => {
                assert!(f.services[0].rpcs[0].server_streaming);
                assert!(!f.services[0].rpcs[0].client_streaming);
            }
            _ => panic!("expected protobuf"),
        }
    }

    #[test]
    fn missing_import_is_invalid() {
        let parser = ProtobufParser;
        let text = r#"
            syntax = "proto3";
            import "common.proto";
            message M { int32 x = 1; }
        "#;
        assert!(parser.parse(&schema(text)).is_err());
    }

    #[test]
    fn well_known_imports_need_no_reference() {
        let parser = ProtobufParser;
        let text = r#"
            syntax = "proto3";
            import "google/protobuf/timestamp.proto";
            message M { int32 x = 1; }
        "#;
        assert!(parser.parse(&schema(text)).is_ok());
    }

    #[test]
    fn canonicalize_strips_comments_and_is_idempotent() {
        let parser = ProtobufParser;
        let text = "syntax=\"proto3\"; // trailing\nmessage M { /* c */ int32 x = 1; }";
        let parsed = parser.parse(&schema(text)).unwrap();
        let once = parser.canonicalize(&parsed).unwrap();
        let reparsed = parser.parse(&schema(&once)).unwrap();
        let twice = parser.canonicalize(&reparsed).unwrap();
        assert_eq!(once, twice);
    }
}
