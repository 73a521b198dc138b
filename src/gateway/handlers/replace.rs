//! PUT as replace.
//!
//! Connectors only take incremental patches, so a full-object replace is reconciled
//! against the current object: unchanged attributes are dropped, attributes the request
//! no longer carries are set to their zero value, and relation edits become explicit
//! add/delete references. When membership is stored on groups, a user's `groups` become
//! a [`MembershipDiff`] executed as membership calls.
//!
//! In soft-sync mode nothing is cleared or revoked; the plan only adds and updates.
//!
//! Relations absent from the request body are left untouched; an explicit empty value
//! (`"groups": ""` or `[]`) clears them.

use crate::codec::to_canonical;
use crate::connector::{Connector, MODIFY_GROUP_MEMBERS, Verb, action_name, modify_resource};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::core::{HandlerContext, ScimGateway};
use crate::gateway::fanout;
use crate::gateway::handlers::crud::update_memberships;
use crate::gateway::handlers::query::{attach_user_groups, fetch_resource, user_groups};
use crate::model::{CanonicalResource, MemberRef, MultiValueEntry, ResourceKind};
use crate::response::GatewayResponse;
use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Attributes a replace never forwards to the connector.
const NEVER_FORWARDED: &[&str] = &["id", "schemas", "meta"];

/// Attributes never zeroed just because a replace omitted them.
const NEVER_CLEARED: &[&str] = &["password"];

/// Membership changes for one user, by group id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipDiff {
    pub to_add: Vec<String>,
    pub to_revoke: Vec<String>,
}

impl MembershipDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_revoke.is_empty()
    }
}

/// What a replace sends: one patch plus membership changes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplacePlan {
    pub patch: CanonicalResource,
    pub membership: MembershipDiff,
}

impl ReplacePlan {
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.membership.is_empty()
    }
}

/// Zero value of the same shape: `""`, `false`, `0`, objects zeroed key by key;
/// arrays are cleared.
pub fn zero_value(value: &Value) -> Value {
    match value {
        Value::String(_) | Value::Array(_) => Value::String(String::new()),
        Value::Bool(_) => Value::Bool(false),
        Value::Number(_) => Value::from(0),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), zero_value(v)))
                .collect(),
        ),
        Value::Null => Value::Null,
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_zero),
    }
}

fn is_cleared(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

fn skipped(name: &str, list: &[&str]) -> bool {
    list.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Change needed to move `current` to `desired`, or `None` when nothing changes.
fn diff_value(current: Option<&Value>, desired: &Value, soft_sync: bool) -> Option<Value> {
    if let Value::Object(wanted) = desired {
        let empty = Map::new();
        let existing = match current {
            Some(Value::Object(existing)) => existing,
            None | Some(Value::Null) => &empty,
            Some(_) => return Some(desired.clone()),
        };
        let mut changes = Map::new();
        for (key, value) in wanted {
            if let Some(change) = diff_value(existing.get(key), value, soft_sync) {
                changes.insert(key.clone(), change);
            }
        }
        if !soft_sync {
            for (key, value) in existing {
                if !wanted.contains_key(key) && !is_zero(value) {
                    changes.insert(key.clone(), zero_value(value));
                }
            }
        }
        return (!changes.is_empty()).then_some(Value::Object(changes));
    }

    if is_cleared(desired) {
        return match current {
            Some(value) if !soft_sync && !is_zero(value) => Some(zero_value(value)),
            _ => None,
        };
    }
    if current == Some(desired) {
        None
    } else {
        Some(desired.clone())
    }
}

fn diff_entries(
    current: Option<&BTreeMap<String, MultiValueEntry>>,
    desired: Option<&BTreeMap<String, MultiValueEntry>>,
    soft_sync: bool,
) -> BTreeMap<String, MultiValueEntry> {
    let empty = BTreeMap::new();
    let current = current.unwrap_or(&empty);
    let desired = desired.unwrap_or(&empty);
    let mut changes = BTreeMap::new();

    for (type_key, entry) in desired.iter().filter(|(_, e)| !e.is_blank()) {
        let existing = current
            .get(type_key)
            .filter(|e| !e.is_blank())
            .map(|e| Value::Object(e.fields().clone()));
        if let Some(Value::Object(fields)) = diff_value(
            existing.as_ref(),
            &Value::Object(entry.fields().clone()),
            soft_sync,
        ) {
            changes.insert(type_key.clone(), MultiValueEntry::from_fields(fields));
        }
    }
    if !soft_sync {
        for (type_key, entry) in current.iter().filter(|(_, e)| !e.is_blank()) {
            let kept = desired.get(type_key).is_some_and(|e| !e.is_blank());
            if !kept {
                changes.insert(type_key.clone(), entry.blanked());
            }
        }
    }
    changes
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Set difference by opaque value: `(desired - current, current - desired)`.
fn diff_refs(current: &[MemberRef], desired: &[MemberRef], soft_sync: bool) -> MembershipDiff {
    let have: Vec<String> = current.iter().map(|r| decode(&r.value)).collect();
    let mut want: Vec<String> = Vec::new();
    for reference in desired.iter().filter(|r| !r.is_delete()) {
        let value = decode(&reference.value);
        if !want.contains(&value) {
            want.push(value);
        }
    }

    let to_add = want.iter().filter(|v| !have.contains(v)).cloned().collect();
    let to_revoke = if soft_sync {
        Vec::new()
    } else {
        let mut revoke: Vec<String> = Vec::new();
        for value in have.iter().filter(|v| !want.contains(v)) {
            if !revoke.contains(value) {
                revoke.push(value.clone());
            }
        }
        revoke
    };
    MembershipDiff { to_add, to_revoke }
}

/// Compute the patch and membership changes that turn `current` into `desired`.
///
/// `membership_relation` names the relation reconciled through membership calls rather
/// than through the patch.
pub fn plan_replace(
    current: &CanonicalResource,
    desired: &CanonicalResource,
    membership_relation: Option<&str>,
    soft_sync: bool,
) -> ReplacePlan {
    let mut plan = ReplacePlan::default();

    for (name, value) in &desired.attributes {
        if skipped(name, NEVER_FORWARDED) {
            continue;
        }
        if let Some(change) = diff_value(current.attributes.get(name), value, soft_sync) {
            plan.patch.attributes.insert(name.clone(), change);
        }
    }
    if !soft_sync {
        for (name, value) in &current.attributes {
            if skipped(name, NEVER_FORWARDED)
                || skipped(name, NEVER_CLEARED)
                || desired.attributes.contains_key(name)
                || is_zero(value)
            {
                continue;
            }
            plan.patch.attributes.insert(name.clone(), zero_value(value));
        }
    }

    let multi_valued: BTreeSet<&String> = current
        .multi_valued
        .keys()
        .chain(desired.multi_valued.keys())
        .collect();
    for name in multi_valued {
        let desired_entries = if desired.cleared.contains(name) {
            None
        } else {
            desired.multi_valued.get(name)
        };
        let changes = diff_entries(current.multi_valued.get(name), desired_entries, soft_sync);
        if !changes.is_empty() {
            plan.patch.multi_valued.insert(name.clone(), changes);
        }
    }

    let relations: BTreeSet<&String> = desired
        .relations
        .keys()
        .chain(desired.cleared.iter())
        .filter(|name| !desired.multi_valued.contains_key(*name) && !current.multi_valued.contains_key(*name))
        .collect();
    for name in relations {
        let wanted = desired.relation(name).unwrap_or_default();
        let existing = current.relation(name).unwrap_or_default();
        let diff = diff_refs(existing, wanted, soft_sync);
        if membership_relation == Some(name.as_str()) {
            plan.membership = diff;
        } else if !diff.is_empty() {
            let refs = diff
                .to_add
                .into_iter()
                .map(MemberRef::add)
                .chain(diff.to_revoke.into_iter().map(MemberRef::delete))
                .collect();
            plan.patch.relations.insert(name.clone(), refs);
        }
    }

    plan
}

/// Handle `PUT /{endpoint}/{id}`.
pub async fn handle_replace<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    id: &str,
    body: Value,
) -> GatewayResult<GatewayResponse> {
    let mut desired = to_canonical(&body, &gateway.catalog)?;
    desired.id = None;

    let mut current = fetch_resource(gateway, context, kind, id, &[], &[]).await?;
    let membership_relation =
        (kind == ResourceKind::User && gateway.derives_user_groups()).then_some("groups");
    if let Some(relation) = membership_relation {
        if desired.relations.contains_key(relation) || desired.cleared.contains(relation) {
            let groups = user_groups(gateway, context, id.to_string())
                .await
                .map_err(|e| GatewayError::connector(action_name(Verb::Get, ResourceKind::Group), e))?;
            current.relations.insert(relation.to_string(), groups);
        }
    }

    let plan = plan_replace(&current, &desired, membership_relation, gateway.config.soft_sync);
    debug!(
        "Replace of {} '{}': {} attribute changes, {} group adds, {} group revokes (request: '{}')",
        kind.resource_type(),
        id,
        plan.patch.attributes.len() + plan.patch.multi_valued.len() + plan.patch.relations.len(),
        plan.membership.to_add.len(),
        plan.membership.to_revoke.len(),
        context.request_id
    );

    if !plan.patch.is_empty() {
        modify_resource(gateway.connector.as_ref(), kind, &context.connector, id, &plan.patch)
            .await
            .map_err(|e| GatewayError::connector(action_name(Verb::Modify, kind), e))?;
    }
    if !plan.membership.is_empty() {
        let settled = update_memberships(
            gateway,
            context,
            id,
            &plan.membership.to_add,
            &plan.membership.to_revoke,
        )
        .await;
        fanout::collect(MODIFY_GROUP_MEMBERS, settled)?;
    }
    info!(
        "Replaced {} '{}' (request: '{}')",
        kind.resource_type(),
        id,
        context.request_id
    );

    let mut resource = fetch_resource(gateway, context, kind, id, &[], &[]).await?;
    if membership_relation.is_some() {
        attach_user_groups(gateway, context, std::slice::from_mut(&mut resource)).await?;
    }
    Ok(GatewayResponse::ok(
        gateway.encode(context, kind, &resource, true),
        &context.request_id,
    ))
}
