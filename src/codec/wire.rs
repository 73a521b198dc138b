//! Canonical resources re-expanded into protocol objects.

use crate::model::{CanonicalResource, ResourceKind, UNDEFINED_TYPE};
use crate::version::ScimVersion;
use serde_json::{Map, Value};

/// Attributes that are never echoed back to clients.
const WRITE_ONLY: &[&str] = &["password"];

/// Attributes always returned regardless of projection.
const ALWAYS_RETURNED: &[&str] = &["id", "schemas", "meta"];

/// How a resource is rendered for one response.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub version: ScimVersion,
    pub kind: ResourceKind,
    /// Collection URL; when set, `meta.location` is `<base>/<id>`.
    pub location_base: Option<String>,
    pub attributes: Vec<String>,
    pub excluded_attributes: Vec<String>,
}

impl EncodeOptions {
    pub fn new(version: ScimVersion, kind: ResourceKind) -> Self {
        Self {
            version,
            kind,
            location_base: None,
            attributes: Vec::new(),
            excluded_attributes: Vec::new(),
        }
    }

    pub fn with_location_base(mut self, base: impl Into<String>) -> Self {
        self.location_base = Some(base.into());
        self
    }

    pub fn with_projection(mut self, attributes: Vec<String>, excluded: Vec<String>) -> Self {
        self.attributes = attributes;
        self.excluded_attributes = excluded;
        self
    }
}

/// Drop nulls and empty containers, recursively.
fn prune(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k.clone(), v)))
                .collect();
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        Value::Array(items) => {
            let pruned: Vec<Value> = items.iter().filter_map(prune).collect();
            (!pruned.is_empty()).then_some(Value::Array(pruned))
        }
        other => Some(other.clone()),
    }
}

fn normalize_primary(fields: &mut Map<String, Value>) {
    if let Some(Value::String(primary)) = fields.get("primary") {
        let flag = primary.eq_ignore_ascii_case("true");
        fields.insert("primary".to_string(), Value::Bool(flag));
    }
}

/// Render a canonical resource as a protocol object.
pub fn to_wire(resource: &CanonicalResource, options: &EncodeOptions) -> Value {
    let mut object = Map::new();
    let mut schemas = vec![Value::String(
        options.version.core_schema(options.kind).to_string(),
    )];

    if let Some(id) = resource.id() {
        object.insert("id".to_string(), Value::String(id.to_string()));
    }

    for (name, value) in &resource.attributes {
        if WRITE_ONLY.contains(&name.as_str()) || ALWAYS_RETURNED.contains(&name.as_str()) {
            continue;
        }
        let Some(value) = prune(value) else {
            continue;
        };
        if name.starts_with("urn:") && value.is_object() {
            schemas.push(Value::String(name.clone()));
        }
        object.insert(name.clone(), value);
    }

    for (name, entries) in &resource.multi_valued {
        let items: Vec<Value> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_blank())
            .filter_map(|(type_key, entry)| {
                let mut fields = entry.fields().clone();
                if type_key != UNDEFINED_TYPE {
                    fields.insert("type".to_string(), Value::String(type_key.clone()));
                }
                normalize_primary(&mut fields);
                prune(&Value::Object(fields))
            })
            .collect();
        if !items.is_empty() {
            object.insert(name.clone(), Value::Array(items));
        }
    }

    for (name, refs) in &resource.relations {
        let items: Vec<Value> = refs
            .iter()
            .filter(|r| !r.is_delete())
            .map(|r| {
                let mut item = Map::new();
                item.insert("value".to_string(), Value::String(r.value.clone()));
                if let Some(display) = &r.display {
                    item.insert("display".to_string(), Value::String(display.clone()));
                }
                Value::Object(item)
            })
            .collect();
        if !items.is_empty() {
            object.insert(name.clone(), Value::Array(items));
        }
    }

    project(&mut object, &options.attributes, &options.excluded_attributes);

    object.insert("schemas".to_string(), Value::Array(schemas));
    if options.version == ScimVersion::V2 || options.location_base.is_some() {
        let mut meta = Map::new();
        meta.insert(
            "resourceType".to_string(),
            Value::String(options.kind.resource_type().to_string()),
        );
        if let (Some(base), Some(id)) = (&options.location_base, resource.id()) {
            meta.insert(
                "location".to_string(),
                Value::String(format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    urlencoding::encode(id)
                )),
            );
        }
        object.insert("meta".to_string(), Value::Object(meta));
    }
    Value::Object(object)
}

fn split_projection(path: &str) -> (String, Option<String>) {
    match path.split_once('.') {
        Some((head, sub)) if !head.starts_with("urn:") => (head.to_string(), Some(sub.to_string())),
        _ => (path.to_string(), None),
    }
}

fn find_key(object: &Map<String, Value>, name: &str) -> Option<String> {
    object.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

/// Apply `attributes` / `excludedAttributes` to a rendered resource.
///
/// Names are matched case-insensitively and may address one sub-attribute level
/// (`name.givenName`). `id`, `schemas` and `meta` always survive.
pub fn project(object: &mut Map<String, Value>, attributes: &[String], excluded: &[String]) {
    if !attributes.is_empty() {
        let mut kept = Map::new();
        for requested in attributes {
            let (head, sub) = split_projection(requested.trim());
            let Some(key) = find_key(object, &head) else {
                continue;
            };
            match (sub, object.get(&key)) {
                (Some(sub), Some(Value::Object(inner))) => {
                    let Some(sub_key) = find_key(inner, &sub) else {
                        continue;
                    };
                    if let Some(value) = inner.get(&sub_key) {
                        let slot = kept
                            .entry(key.clone())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(target) = slot {
                            target.insert(sub_key, value.clone());
                        }
                    }
                }
                (_, Some(value)) => {
                    kept.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
        for always in ALWAYS_RETURNED {
            if let Some(value) = object.get(*always) {
                kept.insert(always.to_string(), value.clone());
            }
        }
        *object = kept;
    }

    for name in excluded {
        let (head, sub) = split_projection(name.trim());
        if ALWAYS_RETURNED.iter().any(|a| a.eq_ignore_ascii_case(&head)) {
            continue;
        }
        let Some(key) = find_key(object, &head) else {
            continue;
        };
        match sub {
            None => {
                object.remove(&key);
            }
            Some(sub) => {
                if let Some(Value::Object(inner)) = object.get_mut(&key) {
                    if let Some(sub_key) = find_key(inner, &sub) {
                        inner.remove(&sub_key);
                    }
                }
            }
        }
    }
}
