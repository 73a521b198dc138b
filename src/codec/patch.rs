//! Versioned patch operations rewritten into the legacy attribute-object shape.
//!
//! The output is what a legacy client would have sent for the same change: multi-valued
//! attributes as arrays (deleted elements flagged `operation: delete`), scalar writes as
//! nested objects, and scalar removals listed under `meta.attributes`.
//!
//! `attr[primary eq true]` targets are resolved in two phases. Field writes are collected
//! into a per-attribute primary slot while the operations are walked; once every
//! operation has been applied, each slot is emitted as one element flagged
//! `primary: true` carrying the `type` that was written for it, if any.

use super::AttributeCatalog;
use super::path::{PatchPath, set_at_path};
use crate::error::{CodecError, CodecResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Patch verb, case-insensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

impl FromStr for PatchOp {
    type Err = CodecError;

    fn from_str(op: &str) -> Result<Self, Self::Err> {
        match op.to_ascii_lowercase().as_str() {
            "add" => Ok(PatchOp::Add),
            "replace" => Ok(PatchOp::Replace),
            "remove" => Ok(PatchOp::Remove),
            _ => Err(CodecError::UnsupportedOperation { op: op.to_string() }),
        }
    }
}

/// One element of a versioned `Operations` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// True when the body carries a versioned `Operations` list.
pub fn is_versioned_patch(body: &Value) -> bool {
    body.get("Operations").is_some_and(Value::is_array)
}

/// Rewrite a versioned patch body into the legacy shape.
pub fn patch_to_legacy(body: &Value, catalog: &AttributeCatalog) -> CodecResult<Map<String, Value>> {
    let operations = body
        .get("Operations")
        .and_then(Value::as_array)
        .ok_or_else(|| CodecError::InvalidBody {
            details: "missing 'Operations' array".to_string(),
        })?;

    let mut builder = LegacyBuilder::new(catalog);
    for raw in operations {
        let operation: PatchOperation =
            serde_json::from_value(raw.clone()).map_err(|e| CodecError::InvalidBody {
                details: format!("malformed operation: {}", e),
            })?;
        let op = operation.op.parse::<PatchOp>()?;
        builder.apply(op, operation.path.as_deref(), operation.value.as_ref())?;
    }
    Ok(builder.finish())
}

#[derive(Debug, Default)]
struct PrimarySlot {
    fields: Map<String, Value>,
    original_type: Option<String>,
    delete: bool,
}

struct LegacyBuilder<'a> {
    catalog: &'a AttributeCatalog,
    scalars: Map<String, Value>,
    elements: BTreeMap<String, Vec<Map<String, Value>>>,
    removals: Vec<String>,
    primary_slots: BTreeMap<String, PrimarySlot>,
}

fn element_type(element: &Map<String, Value>) -> Option<&str> {
    element.get("type").and_then(Value::as_str)
}

fn is_delete(element: &Map<String, Value>) -> bool {
    element
        .get("operation")
        .and_then(Value::as_str)
        .is_some_and(|op| op.eq_ignore_ascii_case("delete"))
}

fn delete_marker() -> Value {
    Value::String("delete".to_string())
}

impl<'a> LegacyBuilder<'a> {
    fn new(catalog: &'a AttributeCatalog) -> Self {
        Self {
            catalog,
            scalars: Map::new(),
            elements: BTreeMap::new(),
            removals: Vec::new(),
            primary_slots: BTreeMap::new(),
        }
    }

    fn apply(&mut self, op: PatchOp, path: Option<&str>, value: Option<&Value>) -> CodecResult<()> {
        let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
            return self.apply_without_path(op, value);
        };
        match PatchPath::parse(path, self.catalog)? {
            PatchPath::Attribute(segments) => self.apply_attribute(op, path, segments, value),
            PatchPath::TypeFilter {
                attribute,
                type_value,
                sub_attribute,
            } => self.apply_type_filter(op, path, &attribute, &type_value, sub_attribute, value),
            PatchPath::PrimaryFilter {
                attribute,
                sub_attribute,
            } => self.apply_primary_filter(op, path, &attribute, sub_attribute, value),
            PatchPath::ValueFilter {
                attribute,
                value: selector,
                sub_attribute,
            } => self.apply_value_filter(op, path, &attribute, &selector, sub_attribute, value),
        }
    }

    /// Distribute an object value key by key, each key acting as a path.
    fn apply_without_path(&mut self, op: PatchOp, value: Option<&Value>) -> CodecResult<()> {
        let Some(Value::Object(object)) = value else {
            return Err(CodecError::InvalidValue {
                attribute: "value".to_string(),
                details: "an operation without path requires an object value".to_string(),
            });
        };
        for (key, item) in object {
            self.apply(op, Some(key), Some(item))?;
        }
        Ok(())
    }

    fn apply_attribute(
        &mut self,
        op: PatchOp,
        path: &str,
        segments: Vec<String>,
        value: Option<&Value>,
    ) -> CodecResult<()> {
        let attribute = segments[0].clone();
        if self.catalog.is_multi_valued(&attribute) {
            if segments.len() > 1 {
                return Err(CodecError::InvalidPath {
                    path: path.to_string(),
                    reason: "sub-attributes of multi-valued attributes need a filter".to_string(),
                });
            }
            return self.apply_multi_valued(op, &attribute, value);
        }

        match op {
            PatchOp::Remove => {
                self.removals.push(AttributeCatalog::join_path(&segments));
                Ok(())
            }
            PatchOp::Add | PatchOp::Replace => {
                let value = value.ok_or_else(|| CodecError::InvalidValue {
                    attribute: path.to_string(),
                    details: "missing value".to_string(),
                })?;
                self.write_value(segments, value);
                Ok(())
            }
        }
    }

    /// Write leaves of `value` under `segments`, merging into what is already there.
    fn write_value(&mut self, segments: Vec<String>, value: &Value) {
        match value {
            Value::Object(object) if !object.is_empty() => {
                for (key, item) in object {
                    let mut child = segments.clone();
                    child.push(key.clone());
                    self.write_value(child, item);
                }
            }
            _ => {
                let joined = AttributeCatalog::join_path(&segments);
                self.removals
                    .retain(|removal| removal != &joined && !removal.starts_with(&format!("{}.", joined)));
                set_at_path(&mut self.scalars, &segments, value.clone());
            }
        }
    }

    fn apply_multi_valued(
        &mut self,
        op: PatchOp,
        attribute: &str,
        value: Option<&Value>,
    ) -> CodecResult<()> {
        let value = match (op, value) {
            (PatchOp::Remove, None | Some(Value::Null)) => {
                self.removals.push(attribute.to_string());
                return Ok(());
            }
            (_, Some(value)) => value,
            (_, None) => {
                return Err(CodecError::InvalidValue {
                    attribute: attribute.to_string(),
                    details: "missing value".to_string(),
                });
            }
        };

        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let relation = self.catalog.is_relation(attribute);
        for item in items {
            let mut element = match item {
                Value::Object(object) => object.clone(),
                Value::String(s) if relation => {
                    let mut object = Map::new();
                    object.insert("value".to_string(), Value::String(s.clone()));
                    object
                }
                _ => {
                    return Err(CodecError::InvalidValue {
                        attribute: attribute.to_string(),
                        details: "elements must be objects".to_string(),
                    });
                }
            };
            if op == PatchOp::Remove {
                element.insert("operation".to_string(), delete_marker());
            }
            self.elements
                .entry(attribute.to_string())
                .or_default()
                .push(element);
        }
        Ok(())
    }

    fn require_type_keyed(&self, path: &str, attribute: &str) -> CodecResult<()> {
        if self.catalog.is_type_keyed(attribute) {
            Ok(())
        } else {
            Err(CodecError::InvalidPath {
                path: path.to_string(),
                reason: format!("'{}' is not keyed by type", attribute),
            })
        }
    }

    fn apply_type_filter(
        &mut self,
        op: PatchOp,
        path: &str,
        attribute: &str,
        type_value: &str,
        sub_attribute: Option<String>,
        value: Option<&Value>,
    ) -> CodecResult<()> {
        self.require_type_keyed(path, attribute)?;
        let mut fields = Map::new();
        match (op, sub_attribute) {
            (PatchOp::Remove, None) => {
                self.upsert_typed(attribute, type_value, fields, true);
                return Ok(());
            }
            (PatchOp::Remove, Some(field)) => {
                fields.insert(field, Value::String(String::new()));
            }
            (_, Some(field)) => {
                let value = value.ok_or_else(|| CodecError::InvalidValue {
                    attribute: path.to_string(),
                    details: "missing value".to_string(),
                })?;
                fields.insert(field, value.clone());
            }
            (_, None) => match value {
                Some(Value::Object(object)) => {
                    fields = object.clone();
                    fields.remove("type");
                }
                _ => {
                    return Err(CodecError::InvalidValue {
                        attribute: path.to_string(),
                        details: "expected an object value".to_string(),
                    });
                }
            },
        }
        self.upsert_typed(attribute, type_value, fields, false);
        Ok(())
    }

    /// Merge into the element of the given type written by earlier operations, or add one.
    fn upsert_typed(
        &mut self,
        attribute: &str,
        type_value: &str,
        fields: Map<String, Value>,
        delete: bool,
    ) {
        let items = self.elements.entry(attribute.to_string()).or_default();
        let position = items
            .iter()
            .position(|element| element_type(element) == Some(type_value));

        let mut fresh = fields;
        fresh.insert("type".to_string(), Value::String(type_value.to_string()));
        if delete {
            let mut marker = Map::new();
            marker.insert("type".to_string(), Value::String(type_value.to_string()));
            marker.insert("operation".to_string(), delete_marker());
            fresh = marker;
        }

        match position {
            Some(index) if delete || is_delete(&items[index]) => items[index] = fresh,
            Some(index) => items[index].extend(fresh),
            None => items.push(fresh),
        }
    }

    fn apply_primary_filter(
        &mut self,
        op: PatchOp,
        path: &str,
        attribute: &str,
        sub_attribute: Option<String>,
        value: Option<&Value>,
    ) -> CodecResult<()> {
        self.require_type_keyed(path, attribute)?;
        let slot = self.primary_slots.entry(attribute.to_string()).or_default();
        match (op, sub_attribute) {
            (PatchOp::Remove, None) => slot.delete = true,
            (PatchOp::Remove, Some(field)) => {
                slot.fields.insert(field, Value::String(String::new()));
            }
            (_, Some(field)) => {
                let value = value.ok_or_else(|| CodecError::InvalidValue {
                    attribute: path.to_string(),
                    details: "missing value".to_string(),
                })?;
                if field == "type" {
                    slot.original_type = value.as_str().map(String::from);
                } else {
                    slot.fields.insert(field, value.clone());
                }
            }
            (_, None) => {
                let Some(Value::Object(object)) = value else {
                    return Err(CodecError::InvalidValue {
                        attribute: path.to_string(),
                        details: "expected an object value".to_string(),
                    });
                };
                for (field, item) in object {
                    if field == "type" {
                        slot.original_type = item.as_str().map(String::from);
                    } else {
                        slot.fields.insert(field.clone(), item.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_value_filter(
        &mut self,
        op: PatchOp,
        path: &str,
        attribute: &str,
        selector: &str,
        sub_attribute: Option<String>,
        value: Option<&Value>,
    ) -> CodecResult<()> {
        if !self.catalog.is_relation(attribute) {
            return Err(CodecError::InvalidPath {
                path: path.to_string(),
                reason: "value filters are only supported on relation attributes".to_string(),
            });
        }

        let reference = |extra: Option<(&str, Value)>| -> Map<String, Value> {
            let mut element = Map::new();
            element.insert("value".to_string(), Value::String(selector.to_string()));
            if let Some((key, item)) = extra {
                element.insert(key.to_string(), item);
            }
            element
        };

        let mut produced = Vec::new();
        match (op, sub_attribute, value) {
            (PatchOp::Remove, _, _) => produced.push(reference(Some(("operation", delete_marker())))),
            (_, _, None) => {
                return Err(CodecError::InvalidValue {
                    attribute: path.to_string(),
                    details: "missing value".to_string(),
                });
            }
            (_, Some(field), Some(item)) => produced.push(reference(Some((field.as_str(), item.clone())))),
            (_, None, Some(item)) => {
                let mut replacement = match item {
                    Value::Object(object) => object.clone(),
                    Value::String(s) => {
                        let mut object = Map::new();
                        object.insert("value".to_string(), Value::String(s.clone()));
                        object
                    }
                    _ => {
                        return Err(CodecError::InvalidValue {
                            attribute: path.to_string(),
                            details: "expected an object or string value".to_string(),
                        });
                    }
                };
                match replacement.get("value").and_then(Value::as_str) {
                    Some(new_value) if new_value != selector => {
                        produced.push(reference(Some(("operation", delete_marker()))));
                    }
                    _ => {
                        replacement.insert("value".to_string(), Value::String(selector.to_string()));
                    }
                }
                produced.push(replacement);
            }
        }
        self.elements
            .entry(attribute.to_string())
            .or_default()
            .extend(produced);
        Ok(())
    }

    fn finish(mut self) -> Map<String, Value> {
        // Second phase: emit primary slots now that all field writes are known.
        for (attribute, slot) in std::mem::take(&mut self.primary_slots) {
            let mut fields = slot.fields;
            if slot.delete {
                fields.insert("operation".to_string(), delete_marker());
            } else {
                fields.insert("primary".to_string(), Value::Bool(true));
            }
            match slot.original_type {
                Some(type_value) => self.upsert_typed(&attribute, &type_value, fields, slot.delete),
                None => self.elements.entry(attribute).or_default().push(fields),
            }
        }

        let mut object = self.scalars;
        for (attribute, items) in self.elements {
            object.insert(
                attribute,
                Value::Array(items.into_iter().map(Value::Object).collect()),
            );
        }
        if !self.removals.is_empty() {
            let mut meta = Map::new();
            meta.insert(
                "attributes".to_string(),
                Value::Array(self.removals.into_iter().map(Value::String).collect()),
            );
            object.insert("meta".to_string(), Value::Object(meta));
        }
        object
    }
}
