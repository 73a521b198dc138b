//! Canonical resource model shared by the codec, the orchestrator and connectors.
//!
//! Multi-valued attributes whose elements carry a `type` discriminator are held as maps
//! keyed by type, so a connector can address "the work email" directly. Relation
//! attributes (`members`, `groups`) stay lists keyed by opaque value.
//!
//! Omission always means "unchanged"; an explicit empty string means "cleared".

use crate::codec::AttributeCatalog;
use crate::codec::path::get_at_path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Type key used when a multi-value element carries no `type`.
pub const UNDEFINED_TYPE: &str = "undefined";

/// The two resource kinds the gateway provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    User,
    Group,
}

impl ResourceKind {
    /// SCIM `meta.resourceType` value.
    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::User => "User",
            ResourceKind::Group => "Group",
        }
    }

    /// Attributes of which at least one must be present on create.
    pub fn identifying_attributes(self) -> [&'static str; 2] {
        match self {
            ResourceKind::User => ["userName", "externalId"],
            ResourceKind::Group => ["displayName", "externalId"],
        }
    }
}

/// One entry of a type-keyed multi-valued attribute, without its `type`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiValueEntry {
    fields: Map<String, Value>,
}

impl MultiValueEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// True when every field is an empty string (a soft-deleted entry).
    pub fn is_blank(&self) -> bool {
        self.fields
            .values()
            .all(|v| matches!(v, Value::String(s) if s.is_empty()))
    }

    /// Copy with every value field cleared to an empty string.
    ///
    /// `primary` is dropped; an entry with no fields gains `value: ""`.
    pub fn blanked(&self) -> Self {
        let mut fields: Map<String, Value> = self
            .fields
            .keys()
            .filter(|k| k.as_str() != "primary")
            .map(|k| (k.clone(), Value::String(String::new())))
            .collect();
        if fields.is_empty() {
            fields.insert("value".to_string(), Value::String(String::new()));
        }
        Self { fields }
    }
}

/// Requested change on a relation element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberOperation {
    Add,
    Delete,
}

/// Reference to a related resource by opaque value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<MemberOperation>,
}

impl MemberRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display: None,
            operation: None,
        }
    }

    pub fn add(value: impl Into<String>) -> Self {
        Self {
            operation: Some(MemberOperation::Add),
            ..Self::new(value)
        }
    }

    pub fn delete(value: impl Into<String>) -> Self {
        Self {
            operation: Some(MemberOperation::Delete),
            ..Self::new(value)
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn is_delete(&self) -> bool {
        self.operation == Some(MemberOperation::Delete)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A User or Group in canonical form.
///
/// Used both for full objects (create, connector results) and for incremental patches
/// (modify). In a patch, an empty-string scalar, a blank multi-value entry or a name in
/// `cleared` all mean "set to blank".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalResource {
    pub id: Option<String>,
    /// Scalars and complex objects, including namespaced extension objects.
    pub attributes: Map<String, Value>,
    pub multi_valued: BTreeMap<String, BTreeMap<String, MultiValueEntry>>,
    pub relations: BTreeMap<String, Vec<MemberRef>>,
    /// Multi-valued or relation attributes cleared as a whole.
    pub cleared: BTreeSet<String>,
}

impl CanonicalResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_entry(
        mut self,
        attribute: impl Into<String>,
        type_key: impl Into<String>,
        entry: MultiValueEntry,
    ) -> Self {
        self.multi_valued
            .entry(attribute.into())
            .or_default()
            .insert(type_key.into(), entry);
        self
    }

    pub fn with_relation(mut self, attribute: impl Into<String>, refs: Vec<MemberRef>) -> Self {
        self.relations.insert(attribute.into(), refs);
        self
    }

    /// A patch with nothing to send.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.multi_valued.is_empty()
            && self.relations.is_empty()
            && self.cleared.is_empty()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get_str(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).and_then(Value::as_str)
    }

    pub fn relation(&self, attribute: &str) -> Option<&[MemberRef]> {
        self.relations.get(attribute).map(Vec::as_slice)
    }

    /// Text values found at a filter or sort path such as `userName`, `emails.value`
    /// or `members.value`.
    pub fn values_at(&self, attribute: &str) -> Vec<String> {
        if attribute.eq_ignore_ascii_case("id") {
            return self.id().map(String::from).into_iter().collect();
        }
        let segments = AttributeCatalog::default().split_path(attribute);
        let Some((head, rest)) = segments.split_first() else {
            return Vec::new();
        };

        if let Some(refs) = self.relations.get(head.as_str()) {
            let field = rest.first().map(String::as_str).unwrap_or("value");
            return refs
                .iter()
                .filter_map(|r| match field {
                    "value" => Some(r.value.clone()),
                    "display" => r.display.clone(),
                    _ => None,
                })
                .collect();
        }
        if let Some(entries) = self.multi_valued.get(head.as_str()) {
            let field = rest.first().map(String::as_str).unwrap_or("value");
            return entries
                .iter()
                .filter_map(|(type_key, entry)| match field {
                    "type" => Some(type_key.clone()),
                    _ => entry.get(field).and_then(scalar_text),
                })
                .collect();
        }
        get_at_path(&self.attributes, &segments)
            .and_then(scalar_text)
            .into_iter()
            .collect()
    }

    /// Render the canonical JSON shape handed to JSON-based connectors.
    ///
    /// Type-keyed attributes become objects keyed by type; cleared attributes become `""`.
    pub fn to_canonical_json(&self) -> Value {
        let mut object = self.attributes.clone();
        if let Some(id) = &self.id {
            object.insert("id".to_string(), Value::String(id.clone()));
        }
        for (attribute, entries) in &self.multi_valued {
            let keyed: Map<String, Value> = entries
                .iter()
                .map(|(type_key, entry)| {
                    let mut fields = entry.fields().clone();
                    fields.insert("type".to_string(), Value::String(type_key.clone()));
                    (type_key.clone(), Value::Object(fields))
                })
                .collect();
            object.insert(attribute.clone(), Value::Object(keyed));
        }
        for (attribute, refs) in &self.relations {
            object.insert(
                attribute.clone(),
                serde_json::to_value(refs).unwrap_or(Value::Array(Vec::new())),
            );
        }
        for attribute in &self.cleared {
            object.insert(attribute.clone(), Value::String(String::new()));
        }
        Value::Object(object)
    }
}
