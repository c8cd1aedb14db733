//! Context name normalization and validation (spec §3, §4.5).
//!
//! A context is either exactly `.` (the default) or a dot-prefixed label
//! using letters, digits, `-`, `_`. The wire token `:.:` is an alias for
//! the default; an empty string also normalizes to the default.

use crate::error::Error;
use registry_storage::DEFAULT_CONTEXT;

/// Normalize and validate a context name as it arrives from a URL path
/// segment (e.g. `/contexts/{context}/...`). Returns the canonical form
/// (`.` or `.label`).
pub fn normalize(raw: &str) -> Result<String, Error> {
    let raw = raw.trim();
    if raw.is_empty() || raw == DEFAULT_CONTEXT {
        return Ok(DEFAULT_CONTEXT.to_string());
    }
    if raw == ":.:" {
        return Ok(DEFAULT_CONTEXT.to_string());
    }

    let label = raw.strip_prefix('.').unwrap_or(raw);
    if label.is_empty() {
        return Ok(DEFAULT_CONTEXT.to_string());
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Invalid(format!("invalid context name: {raw}")));
    }

    Ok(format!(".{label}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_resolve_to_default() {
        assert_eq!(normalize("").unwrap(), ".");
        assert_eq!(normalize(".").unwrap(), ".");
    }

    #[test]
    fn wire_alias_resolves_to_default() {
        assert_eq!(normalize(":.:").unwrap(), ".");
    }

    #[test]
    fn dot_prefixed_label_is_canonical() {
        assert_eq!(normalize(".prod").unwrap(), ".prod");
        assert_eq!(normalize("prod").unwrap(), ".prod");
        assert_eq!(normalize("team-a").unwrap(), ".team-a");
    }

    #[test]
    fn disallowed_characters_are_rejected() {
        assert!(normalize("has space").is_err());
        assert!(normalize("invalid!name").is_err());
    }
}
