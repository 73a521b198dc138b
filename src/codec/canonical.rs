//! Legacy-shaped attribute objects folded into [`CanonicalResource`].

use super::AttributeCatalog;
use super::path::{get_at_path, set_at_path};
use crate::error::{CodecError, CodecResult};
use crate::model::{
    CanonicalResource, MemberOperation, MemberRef, MultiValueEntry, UNDEFINED_TYPE,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute whose type-keyed entries may be assembled from several elements.
const ADDRESSES: &str = "addresses";

fn is_cleared(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Fold a legacy-shaped object into canonical form.
///
/// Multi-valued attributes are keyed by `type` (missing type becomes `"undefined"`);
/// elements flagged `operation: delete` become blank entries unless a live element of
/// the same type is also present. Paths listed under `meta.attributes` become blank
/// writes.
pub fn to_canonical(body: &Value, catalog: &AttributeCatalog) -> CodecResult<CanonicalResource> {
    let object = body.as_object().ok_or_else(|| CodecError::InvalidBody {
        details: "expected a JSON object".to_string(),
    })?;

    let mut resource = CanonicalResource::new();
    let mut removals = Vec::new();

    for (key, value) in object {
        match key.as_str() {
            "schemas" => {}
            "meta" => removals.extend(meta_removals(value)),
            "id" => resource.id = value.as_str().map(String::from),
            "active" => {
                resource
                    .attributes
                    .insert(key.clone(), normalize_active(value));
            }
            name if catalog.is_type_keyed(name) => {
                if is_cleared(value) {
                    resource.cleared.insert(key.clone());
                } else {
                    let entries = fold_type_keyed(name, value)?;
                    resource.multi_valued.insert(key.clone(), entries);
                }
            }
            name if catalog.is_relation(name) => {
                if is_cleared(value) {
                    resource.cleared.insert(key.clone());
                } else {
                    let refs = parse_relation(name, value)?;
                    resource.relations.insert(key.clone(), refs);
                }
            }
            _ => {
                resource.attributes.insert(key.clone(), value.clone());
            }
        }
    }

    for path in removals {
        apply_removal(&mut resource, catalog, &path)?;
    }
    Ok(resource)
}

fn meta_removals(meta: &Value) -> Vec<String> {
    meta.get("attributes")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_active(value: &Value) -> Value {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        other => other.clone(),
    }
}

fn apply_removal(
    resource: &mut CanonicalResource,
    catalog: &AttributeCatalog,
    path: &str,
) -> CodecResult<()> {
    let segments = catalog.split_path(path);
    let Some(head) = segments.first() else {
        return Ok(());
    };
    if catalog.is_multi_valued(head) {
        if segments.len() > 1 {
            return Err(CodecError::InvalidPath {
                path: path.to_string(),
                reason: "cannot remove a sub-attribute of a multi-valued attribute".to_string(),
            });
        }
        // A whole-attribute removal only clears when the body wrote nothing for it.
        if !resource.multi_valued.contains_key(head) && !resource.relations.contains_key(head) {
            resource.cleared.insert(head.clone());
        }
        return Ok(());
    }
    if get_at_path(&resource.attributes, &segments).is_none() {
        set_at_path(
            &mut resource.attributes,
            &segments,
            Value::String(String::new()),
        );
    }
    Ok(())
}

fn take_operation(fields: &mut Map<String, Value>) -> Option<MemberOperation> {
    match fields.remove("operation") {
        Some(Value::String(op)) if op.eq_ignore_ascii_case("delete") => {
            Some(MemberOperation::Delete)
        }
        Some(Value::String(op)) if op.eq_ignore_ascii_case("add") => Some(MemberOperation::Add),
        _ => None,
    }
}

fn fold_type_keyed(
    attribute: &str,
    value: &Value,
) -> CodecResult<BTreeMap<String, MultiValueEntry>> {
    match value {
        Value::Array(items) => {
            let mut entries: BTreeMap<String, MultiValueEntry> = BTreeMap::new();
            let mut deleted: BTreeSet<String> = BTreeSet::new();
            for item in items {
                let Value::Object(element) = item else {
                    return Err(CodecError::InvalidValue {
                        attribute: attribute.to_string(),
                        details: "elements must be objects".to_string(),
                    });
                };
                let mut fields = element.clone();
                let type_key = match fields.remove("type") {
                    Some(Value::String(t)) if !t.is_empty() => t,
                    _ => UNDEFINED_TYPE.to_string(),
                };
                let delete = take_operation(&mut fields) == Some(MemberOperation::Delete);
                let entry = MultiValueEntry::from_fields(fields);

                if delete {
                    if !entries.contains_key(&type_key) {
                        entries.insert(type_key.clone(), entry.blanked());
                        deleted.insert(type_key);
                    }
                    continue;
                }
                if deleted.remove(&type_key) {
                    entries.insert(type_key, entry);
                    continue;
                }
                match entries.get_mut(&type_key) {
                    None => {
                        entries.insert(type_key, entry);
                    }
                    Some(existing) if attribute == ADDRESSES => {
                        merge_address(existing, entry, &type_key)?;
                    }
                    Some(_) => {
                        return Err(CodecError::TypeKeyCollision {
                            attribute: attribute.to_string(),
                            type_key,
                        });
                    }
                }
            }
            Ok(entries)
        }
        // Already keyed by type: {"work": {...}, "home": {...}}
        Value::Object(keyed) => keyed
            .iter()
            .map(|(type_key, item)| match item {
                Value::Object(fields) => {
                    let mut fields = fields.clone();
                    fields.remove("type");
                    let delete = take_operation(&mut fields) == Some(MemberOperation::Delete);
                    let entry = MultiValueEntry::from_fields(fields);
                    Ok((type_key.clone(), if delete { entry.blanked() } else { entry }))
                }
                _ => Err(CodecError::InvalidValue {
                    attribute: attribute.to_string(),
                    details: format!("entry '{}' must be an object", type_key),
                }),
            })
            .collect(),
        _ => Err(CodecError::InvalidValue {
            attribute: attribute.to_string(),
            details: "expected an array".to_string(),
        }),
    }
}

/// Address elements of the same type merge field by field; only a conflicting value
/// for the same field is a collision.
fn merge_address(
    existing: &mut MultiValueEntry,
    incoming: MultiValueEntry,
    type_key: &str,
) -> CodecResult<()> {
    for (field, value) in incoming.fields() {
        match existing.get(field) {
            Some(current) if current != value => {
                return Err(CodecError::AddressFieldCollision {
                    type_key: type_key.to_string(),
                    field: field.clone(),
                });
            }
            Some(_) => {}
            None => existing.set(field.clone(), value.clone()),
        }
    }
    Ok(())
}

fn decode_reference(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn parse_relation(attribute: &str, value: &Value) -> CodecResult<Vec<MemberRef>> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => {
            return Err(CodecError::InvalidValue {
                attribute: attribute.to_string(),
                details: "expected an array of references".to_string(),
            });
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(MemberRef::new(decode_reference(s))),
            Value::Object(element) => {
                let mut fields = element.clone();
                let operation = take_operation(&mut fields);
                let reference = fields
                    .get("value")
                    .and_then(Value::as_str)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| CodecError::MissingAttribute {
                        attribute: format!("{}.value", attribute),
                    })?;
                Ok(MemberRef {
                    value: decode_reference(reference),
                    display: fields.get("display").and_then(Value::as_str).map(String::from),
                    operation,
                })
            }
            _ => Err(CodecError::InvalidValue {
                attribute: attribute.to_string(),
                details: "references must be objects or strings".to_string(),
            }),
        })
        .collect()
}
