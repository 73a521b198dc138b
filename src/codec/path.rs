//! Attribute path handling.
//!
//! Paths are dotted (`name.givenName`) except that a namespaced schema prefix such as
//! `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User` is one segment even
//! though it contains dots.

use super::AttributeCatalog;
use crate::error::{CodecError, CodecResult};
use crate::version::ScimVersion;
use serde_json::{Map, Value};

fn is_urn(path: &str) -> bool {
    path.get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
}

/// Case-insensitive prefix strip returning the remainder.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

impl AttributeCatalog {
    /// Split an attribute path into segments, keeping schema URNs whole.
    ///
    /// `urn:…:enterprise:2.0:User:manager.value` → `[urn:…:enterprise:2.0:User, manager, value]`
    pub fn split_path(&self, path: &str) -> Vec<String> {
        if !is_urn(path) {
            return path.split('.').map(String::from).collect();
        }
        for schema in &self.extension_schemas {
            if path.eq_ignore_ascii_case(schema) {
                return vec![schema.clone()];
            }
            if let Some(rest) =
                strip_prefix_ignore_case(path, schema).and_then(|r| r.strip_prefix(':'))
            {
                let mut segments = vec![schema.clone()];
                segments.extend(rest.split('.').map(String::from));
                return segments;
            }
        }
        // Unregistered namespace: the attribute part is the suffix after the last ':'
        // unless that suffix names a resource (`...:User`), in which case the whole path
        // is the schema.
        match path.rfind(':') {
            Some(idx) => {
                let (schema, rest) = (&path[..idx], &path[idx + 1..]);
                let names_resource = rest.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                    && !rest.contains('.');
                if names_resource || rest.is_empty() {
                    vec![path.to_string()]
                } else {
                    let mut segments = vec![schema.to_string()];
                    segments.extend(rest.split('.').map(String::from));
                    segments
                }
            }
            None => vec![path.to_string()],
        }
    }

    /// Inverse of [`split_path`](Self::split_path).
    pub fn join_path(segments: &[String]) -> String {
        match segments.split_first() {
            Some((first, rest)) if is_urn(first) && !rest.is_empty() => {
                format!("{}:{}", first, rest.join("."))
            }
            _ => segments.join("."),
        }
    }
}

/// Remove a core schema qualifier (`urn:…:core:2.0:User:`) from a patch path.
pub fn strip_core_schema(path: &str) -> &str {
    for schema in ScimVersion::core_schema_prefixes() {
        if let Some(rest) = strip_prefix_ignore_case(path, schema).and_then(|r| r.strip_prefix(':'))
        {
            return rest;
        }
    }
    path
}

/// Strip one pair of surrounding double quotes and unescape `\"`.
pub fn unquote(value: &str) -> String {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed);
    inner.replace("\\\"", "\"")
}

/// Target of a versioned patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchPath {
    /// Plain or dotted attribute path, already split into segments
    Attribute(Vec<String>),
    /// `attr[type eq "x"]` with optional `.field`
    TypeFilter {
        attribute: String,
        type_value: String,
        sub_attribute: Option<String>,
    },
    /// `attr[primary eq true]` with optional `.field`
    PrimaryFilter {
        attribute: String,
        sub_attribute: Option<String>,
    },
    /// `attr[value eq "x"]` with optional `.field`
    ValueFilter {
        attribute: String,
        value: String,
        sub_attribute: Option<String>,
    },
}

impl PatchPath {
    pub fn parse(path: &str, catalog: &AttributeCatalog) -> CodecResult<Self> {
        let invalid = |reason: &str| CodecError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = strip_core_schema(path.trim());
        if trimmed.is_empty() {
            return Err(invalid("empty path"));
        }

        let Some(open) = trimmed.find('[') else {
            return Ok(PatchPath::Attribute(catalog.split_path(trimmed)));
        };
        let close = trimmed
            .rfind(']')
            .filter(|close| *close > open)
            .ok_or_else(|| invalid("unbalanced brackets"))?;

        let attribute = trimmed[..open].trim().to_string();
        if attribute.is_empty() {
            return Err(invalid("missing attribute before filter"));
        }
        let tail = &trimmed[close + 1..];
        let sub_attribute = if tail.is_empty() {
            None
        } else {
            let sub = tail
                .strip_prefix('.')
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("expected '.' after filter"))?;
            Some(sub.to_string())
        };

        let mut parts = trimmed[open + 1..close].trim().splitn(3, char::is_whitespace);
        let (Some(filter_attribute), Some(operator), Some(raw_value)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("filter must be '<attribute> eq <value>'"));
        };
        if !operator.eq_ignore_ascii_case("eq") {
            return Err(invalid("only 'eq' is supported inside path filters"));
        }
        let value = unquote(raw_value);

        match filter_attribute {
            "type" => Ok(PatchPath::TypeFilter {
                attribute,
                type_value: value,
                sub_attribute,
            }),
            "primary" if value.eq_ignore_ascii_case("true") => Ok(PatchPath::PrimaryFilter {
                attribute,
                sub_attribute,
            }),
            "primary" => Err(invalid("only 'primary eq true' is supported")),
            "value" => Ok(PatchPath::ValueFilter {
                attribute,
                value,
                sub_attribute,
            }),
            _ => Err(invalid("filter attribute must be type, primary or value")),
        }
    }
}

/// Write `value` at a nested path, creating intermediate objects.
pub fn set_at_path(object: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = object;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}

/// Read the value at a nested path.
pub fn get_at_path<'a>(object: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    rest.iter()
        .try_fold(object.get(first)?, |current, segment| current.get(segment))
}
