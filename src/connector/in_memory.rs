//! In-memory connector.
//!
//! A thread-safe reference backend keeping canonical resources per tenant behind a
//! tokio `RwLock`. It implements simple filters (`eq`, `ne`, `co`, `sw`, `ew`, `pr` and
//! ordering comparisons) but not compound expressions, matching what small backends
//! typically offer. Patches follow canonical semantics: an empty string clears a
//! field, a blank multi-value entry removes that type, and relation references carry
//! their own add/delete operation.
//!
//! Results are ordered by `sortBy`/`sortOrder` before pagination.
//!
//! For tests it can record every call, keep the queries it received and be told to
//! fail selected calls.

use super::{Connector, ConnectorContext, ConnectorError, ConnectorResult, ResourceList, MODIFY_GROUP_MEMBERS};
use crate::filter::{FilterOperator, GetFilter, Predicate};
use crate::model::{CanonicalResource, MemberRef, MultiValueEntry, ResourceKind};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
struct TenantData {
    users: BTreeMap<String, CanonicalResource>,
    groups: BTreeMap<String, CanonicalResource>,
}

impl TenantData {
    fn collection(&self, kind: ResourceKind) -> &BTreeMap<String, CanonicalResource> {
        match kind {
            ResourceKind::User => &self.users,
            ResourceKind::Group => &self.groups,
        }
    }

    fn collection_mut(&mut self, kind: ResourceKind) -> &mut BTreeMap<String, CanonicalResource> {
        match kind {
            ResourceKind::User => &mut self.users,
            ResourceKind::Group => &mut self.groups,
        }
    }
}

/// Thread-safe in-memory connector.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    // Structure: tenant -> users/groups -> id -> resource
    data: Arc<RwLock<HashMap<String, TenantData>>>,
    failures: Arc<RwLock<HashSet<(String, String)>>>,
    calls: Arc<RwLock<Vec<String>>>,
    queries: Arc<RwLock<Vec<ReceivedQuery>>>,
    report_totals: bool,
}

/// A query as the connector received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedQuery {
    pub action: String,
    pub filter: GetFilter,
    pub attributes: Vec<String>,
    pub passthrough: Option<String>,
}

impl std::fmt::Debug for InMemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnector")
            .field("report_totals", &self.report_totals)
            .finish_non_exhaustive()
    }
}

fn unique_attribute(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::User => "userName",
        ResourceKind::Group => "displayName",
    }
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self {
            report_totals: true,
            ..Self::default()
        }
    }

    /// Leave `total_results` unset in query results.
    pub fn without_total_results(mut self) -> Self {
        self.report_totals = false;
        self
    }

    /// Make `action` fail whenever it addresses `key` (an id, a filter value, or `*`).
    pub async fn fail_on(&self, action: &str, key: &str) {
        self.failures
            .write()
            .await
            .insert((action.to_string(), key.to_string()));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Calls seen so far, formatted `action:key`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
        self.queries.write().await.clear();
    }

    /// Queries received by `action`, oldest first.
    pub async fn queries_to(&self, action: &str) -> Vec<ReceivedQuery> {
        self.queries
            .read()
            .await
            .iter()
            .filter(|q| q.action == action)
            .cloned()
            .collect()
    }

    /// Calls whose action matches, formatted `action:key`.
    pub async fn calls_to(&self, action: &str) -> Vec<String> {
        let prefix = format!("{}:", action);
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Insert a resource directly, bypassing uniqueness checks.
    pub async fn seed(&self, tenant: &str, kind: ResourceKind, resource: CanonicalResource) -> String {
        let id = resource
            .id()
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut data = self.data.write().await;
        data.entry(tenant.to_string())
            .or_default()
            .collection_mut(kind)
            .insert(id.clone(), resource.with_id(id.clone()));
        id
    }

    /// Stored resource, for assertions.
    pub async fn stored(&self, tenant: &str, kind: ResourceKind, id: &str) -> Option<CanonicalResource> {
        let data = self.data.read().await;
        data.get(tenant)
            .and_then(|t| t.collection(kind).get(id))
            .cloned()
    }

    async fn enter(&self, action: &str, key: &str) -> ConnectorResult<()> {
        self.calls.write().await.push(format!("{}:{}", action, key));
        let failures = self.failures.read().await;
        if failures.contains(&(action.to_string(), key.to_string()))
            || failures.contains(&(action.to_string(), "*".to_string()))
        {
            return Err(ConnectorError::Failed(format!(
                "injected failure for {} {}",
                action, key
            )));
        }
        Ok(())
    }

    async fn query(
        &self,
        context: &ConnectorContext,
        kind: ResourceKind,
        action: &str,
        filter: &GetFilter,
        attributes: &[String],
    ) -> ConnectorResult<ResourceList> {
        self.queries.write().await.push(ReceivedQuery {
            action: action.to_string(),
            filter: filter.clone(),
            attributes: attributes.to_vec(),
            passthrough: context.passthrough.clone(),
        });
        self.enter(action, filter.value().unwrap_or("*")).await?;
        if filter.raw_filter().is_some() {
            return Err(ConnectorError::Failed(
                "compound filters are not supported".to_string(),
            ));
        }

        let data = self.data.read().await;
        let mut matched: Vec<CanonicalResource> = data
            .get(&context.tenant)
            .map(|tenant| {
                tenant
                    .collection(kind)
                    .values()
                    .filter(|resource| resource_matches(resource, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        filter.sort(&mut matched);

        let total = matched.len();
        let start = filter.start_index.unwrap_or(1).saturating_sub(1);
        let page: Vec<CanonicalResource> = match filter.count {
            Some(count) => matched.into_iter().skip(start).take(count).collect(),
            None => matched.into_iter().skip(start).collect(),
        };

        let list = ResourceList::new(page);
        Ok(if self.report_totals {
            list.with_total(total)
        } else {
            list
        })
    }

    async fn create(
        &self,
        context: &ConnectorContext,
        kind: ResourceKind,
        action: &str,
        resource: &CanonicalResource,
    ) -> ConnectorResult<CanonicalResource> {
        let unique = unique_attribute(kind);
        self.enter(action, resource.get_str(unique).unwrap_or("*")).await?;

        let mut data = self.data.write().await;
        let collection = data
            .entry(context.tenant.clone())
            .or_default()
            .collection_mut(kind);
        if let Some(name) = resource.get_str(unique) {
            if collection
                .values()
                .any(|existing| existing.get_str(unique).is_some_and(|n| n.eq_ignore_ascii_case(name)))
            {
                return Err(ConnectorError::Conflict(format!(
                    "{} '{}' already exists",
                    unique, name
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut stored = CanonicalResource::new().with_id(id.clone());
        merge(&mut stored, resource);
        collection.insert(id, stored.clone());
        Ok(stored)
    }

    async fn modify(
        &self,
        context: &ConnectorContext,
        kind: ResourceKind,
        action: &str,
        id: &str,
        patch: &CanonicalResource,
    ) -> ConnectorResult<()> {
        self.enter(action, id).await?;
        let unique = unique_attribute(kind);

        let mut data = self.data.write().await;
        let collection = data
            .get_mut(&context.tenant)
            .map(|tenant| tenant.collection_mut(kind))
            .ok_or_else(|| ConnectorError::NotFound(format!("{} not found", id)))?;

        if let Some(name) = patch.get_str(unique).filter(|n| !n.is_empty()) {
            let taken = collection.iter().any(|(other_id, existing)| {
                other_id != id
                    && existing
                        .get_str(unique)
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
            });
            if taken {
                return Err(ConnectorError::Conflict(format!(
                    "{} '{}' already exists",
                    unique, name
                )));
            }
        }

        let stored = collection
            .get_mut(id)
            .ok_or_else(|| ConnectorError::NotFound(format!("{} not found", id)))?;
        merge(stored, patch);
        Ok(())
    }

    async fn delete(
        &self,
        context: &ConnectorContext,
        kind: ResourceKind,
        action: &str,
        id: &str,
    ) -> ConnectorResult<()> {
        self.enter(action, id).await?;
        let mut data = self.data.write().await;
        data.get_mut(&context.tenant)
            .and_then(|tenant| tenant.collection_mut(kind).remove(id))
            .map(|_| ())
            .ok_or_else(|| ConnectorError::NotFound(format!("{} not found", id)))
    }
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.is_empty())
}

/// Merge `patch` into `target`: `""` removes, objects merge recursively.
fn merge_object(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match value {
            v if is_blank(v) => {
                target.remove(key);
            }
            Value::Object(inner) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(existing) = slot {
                    merge_object(existing, inner);
                    if existing.is_empty() {
                        target.remove(key);
                    }
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

fn apply_relation(target: &mut Vec<MemberRef>, edits: &[MemberRef]) {
    for edit in edits {
        target.retain(|existing| existing.value != edit.value);
        if !edit.is_delete() {
            target.push(MemberRef {
                value: edit.value.clone(),
                display: edit.display.clone(),
                operation: None,
            });
        }
    }
}

fn merge(target: &mut CanonicalResource, patch: &CanonicalResource) {
    merge_object(&mut target.attributes, &patch.attributes);

    for (attribute, entries) in &patch.multi_valued {
        let stored = target.multi_valued.entry(attribute.clone()).or_default();
        for (type_key, entry) in entries {
            if entry.is_blank() {
                stored.remove(type_key);
                continue;
            }
            let mut fields = stored
                .get(type_key)
                .map(|e| e.fields().clone())
                .unwrap_or_default();
            merge_object(&mut fields, entry.fields());
            stored.insert(type_key.clone(), MultiValueEntry::from_fields(fields));
        }
        if stored.is_empty() {
            target.multi_valued.remove(attribute);
        }
    }

    for (attribute, edits) in &patch.relations {
        let stored = target.relations.entry(attribute.clone()).or_default();
        apply_relation(stored, edits);
        if stored.is_empty() {
            target.relations.remove(attribute);
        }
    }

    for attribute in &patch.cleared {
        target.multi_valued.remove(attribute);
        target.relations.remove(attribute);
        target.attributes.remove(attribute);
    }
}

fn compare(actual: &str, operator: FilterOperator, expected: &str) -> bool {
    let actual_lower = actual.to_lowercase();
    let expected_lower = expected.to_lowercase();
    match operator {
        FilterOperator::Equal => actual_lower == expected_lower,
        FilterOperator::NotEqual => actual_lower != expected_lower,
        FilterOperator::Contains => actual_lower.contains(&expected_lower),
        FilterOperator::StartsWith => actual_lower.starts_with(&expected_lower),
        FilterOperator::EndsWith => actual_lower.ends_with(&expected_lower),
        FilterOperator::Present => !actual.is_empty(),
        FilterOperator::GreaterThan => actual_lower > expected_lower,
        FilterOperator::GreaterThanOrEqual => actual_lower >= expected_lower,
        FilterOperator::LessThan => actual_lower < expected_lower,
        FilterOperator::LessThanOrEqual => actual_lower <= expected_lower,
    }
}

fn resource_matches(resource: &CanonicalResource, filter: &GetFilter) -> bool {
    match &filter.predicate {
        None => true,
        Some(Predicate::Raw(_)) => false,
        Some(Predicate::Simple {
            attribute,
            operator,
            value,
        }) => {
            let candidates = resource.values_at(attribute);
            match (operator, value) {
                (FilterOperator::Present, _) => candidates.iter().any(|c| !c.is_empty()),
                (FilterOperator::NotEqual, Some(expected)) => {
                    candidates.iter().all(|c| compare(c, *operator, expected))
                }
                (_, Some(expected)) => candidates.iter().any(|c| compare(c, *operator, expected)),
                (_, None) => false,
            }
        }
    }
}

impl Connector for InMemoryConnector {
    async fn get_users(
        &self,
        context: &ConnectorContext,
        filter: &GetFilter,
        attributes: &[String],
    ) -> ConnectorResult<ResourceList> {
        self.query(context, ResourceKind::User, "getUsers", filter, attributes).await
    }

    async fn create_user(
        &self,
        context: &ConnectorContext,
        user: &CanonicalResource,
    ) -> ConnectorResult<CanonicalResource> {
        self.create(context, ResourceKind::User, "createUser", user).await
    }

    async fn modify_user(
        &self,
        context: &ConnectorContext,
        id: &str,
        patch: &CanonicalResource,
    ) -> ConnectorResult<()> {
        self.modify(context, ResourceKind::User, "modifyUser", id, patch).await
    }

    async fn delete_user(&self, context: &ConnectorContext, id: &str) -> ConnectorResult<()> {
        self.delete(context, ResourceKind::User, "deleteUser", id).await
    }

    async fn get_groups(
        &self,
        context: &ConnectorContext,
        filter: &GetFilter,
        attributes: &[String],
    ) -> ConnectorResult<ResourceList> {
        self.query(context, ResourceKind::Group, "getGroups", filter, attributes).await
    }

    async fn create_group(
        &self,
        context: &ConnectorContext,
        group: &CanonicalResource,
    ) -> ConnectorResult<CanonicalResource> {
        self.create(context, ResourceKind::Group, "createGroup", group).await
    }

    async fn modify_group(
        &self,
        context: &ConnectorContext,
        id: &str,
        patch: &CanonicalResource,
    ) -> ConnectorResult<()> {
        self.modify(context, ResourceKind::Group, "modifyGroup", id, patch).await
    }

    async fn delete_group(&self, context: &ConnectorContext, id: &str) -> ConnectorResult<()> {
        self.delete(context, ResourceKind::Group, "deleteGroup", id).await
    }

    async fn modify_group_members(
        &self,
        context: &ConnectorContext,
        group_id: &str,
        members: &[MemberRef],
    ) -> ConnectorResult<()> {
        self.enter(MODIFY_GROUP_MEMBERS, group_id).await?;
        let mut data = self.data.write().await;
        let group = data
            .get_mut(&context.tenant)
            .and_then(|tenant| tenant.groups.get_mut(group_id))
            .ok_or_else(|| ConnectorError::NotFound(format!("group {} not found", group_id)))?;
        let stored = group.relations.entry("members".to_string()).or_default();
        apply_relation(stored, members);
        if stored.is_empty() {
            group.relations.remove("members");
        }
        Ok(())
    }
}
