//! Query operation handlers
//!
//! Single fetches and filtered lists, including the union of OR-chained equality
//! lookups and the derivation of a user's `groups` from group membership.

use crate::connector::{Connector, ConnectorResult, Verb, action_name, get_resources};
use crate::error::{GatewayError, GatewayResult};
use crate::filter::{FilterPlan, GetFilter, parse_filter};
use crate::gateway::core::{HandlerContext, ScimGateway};
use crate::gateway::fanout;
use crate::model::{CanonicalResource, MemberRef, ResourceKind};
use crate::response::{GatewayResponse, list_envelope};
use log::debug;
use std::collections::HashSet;

/// Groups the user belongs to, derived by querying group membership.
pub(crate) async fn user_groups<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    user_id: String,
) -> ConnectorResult<Vec<MemberRef>> {
    let attributes = vec!["id".to_string(), "displayName".to_string()];
    let groups = gateway
        .connector
        .get_groups(
            &context.connector,
            &GetFilter::equals("members.value", user_id),
            &attributes,
        )
        .await?;
    Ok(groups
        .resources
        .iter()
        .filter_map(|group| {
            let reference = MemberRef::new(group.id()?);
            Some(match group.get_str("displayName") {
                Some(display) => reference.with_display(display),
                None => reference,
            })
        })
        .collect())
}

/// Whether `groups` must be derived for users in this request.
fn wants_user_groups<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
) -> bool {
    let query = &context.query;
    kind == ResourceKind::User
        && gateway.derives_user_groups()
        && (query.attributes.is_empty() || query.requests("groups"))
        && !query.excludes("groups")
}

/// Attach derived `groups` to every user the connector returned without them.
pub(crate) async fn attach_user_groups<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    users: &mut [CanonicalResource],
) -> GatewayResult<()> {
    let pending: Vec<usize> = users
        .iter()
        .enumerate()
        .filter(|(_, user)| user.id().is_some() && !user.relations.contains_key("groups"))
        .map(|(index, _)| index)
        .collect();
    let tasks: Vec<_> = pending
        .iter()
        .filter_map(|&index| users[index].id().map(String::from))
        .map(|id| (format!("user {}", id), user_groups(gateway, context, id)))
        .collect();

    let groups = fanout::collect(
        action_name(Verb::Get, ResourceKind::Group),
        fanout::settle_all(tasks).await,
    )?;
    for (index, refs) in pending.into_iter().zip(groups) {
        users[index].relations.insert("groups".to_string(), refs);
    }
    Ok(())
}

/// Fetch one resource by id; missing resources are a not-found error.
pub(crate) async fn fetch_resource<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    id: &str,
    attributes: &[String],
    excluded_attributes: &[String],
) -> GatewayResult<CanonicalResource> {
    let list = get_resources(
        gateway.connector.as_ref(),
        kind,
        &context.connector,
        &GetFilter::equals("id", id).with_excluded_attributes(excluded_attributes),
        attributes,
    )
    .await
    .map_err(|e| GatewayError::connector(action_name(Verb::Get, kind), e))?;

    let mut resource = list
        .resources
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::resource_not_found(kind.resource_type(), id))?;
    resource.id.get_or_insert_with(|| id.to_string());
    Ok(resource)
}

/// Handle `GET /{endpoint}/{id}`.
pub async fn handle_get<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    id: &str,
) -> GatewayResult<GatewayResponse> {
    let query = &context.query;
    let mut resource = fetch_resource(
        gateway,
        context,
        kind,
        id,
        &query.attributes,
        &query.excluded_attributes,
    )
    .await?;
    if wants_user_groups(gateway, context, kind) {
        attach_user_groups(gateway, context, std::slice::from_mut(&mut resource)).await?;
    }
    Ok(GatewayResponse::ok(
        gateway.encode(context, kind, &resource, true),
        &context.request_id,
    ))
}

/// Handle `GET /{endpoint}` with optional filter and pagination.
pub async fn handle_list<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
) -> GatewayResult<GatewayResponse> {
    let query = &context.query;
    let action = action_name(Verb::Get, kind);
    let default_count = gateway.config.default_count;

    let (mut resources, total_results, start_index) =
        match parse_filter(query.filter.as_deref())? {
            FilterPlan::Single(filter) => {
                let filter = filter
                    .with_pagination(query.start_index, query.count, default_count)
                    .with_sort(query.sort_by.as_deref(), query.sort_order.as_deref())
                    .with_excluded_attributes(&query.excluded_attributes);
                let list = get_resources(
                    gateway.connector.as_ref(),
                    kind,
                    &context.connector,
                    &filter,
                    &query.attributes,
                )
                .await
                .map_err(|e| GatewayError::connector(action, e))?;
                (list.resources, list.total_results, filter.start_index)
            }
            FilterPlan::Union { attribute, clauses } => {
                debug!(
                    "Resolving OR filter on '{}' as {} lookups (request: '{}')",
                    attribute,
                    clauses.len(),
                    context.request_id
                );
                let clauses: Vec<GetFilter> = clauses
                    .into_iter()
                    .map(|clause| clause.with_excluded_attributes(&query.excluded_attributes))
                    .collect();
                let tasks: Vec<_> = clauses
                    .iter()
                    .map(|clause| {
                        (
                            format!("{} eq {:?}", attribute, clause.value().unwrap_or_default()),
                            get_resources(
                                gateway.connector.as_ref(),
                                kind,
                                &context.connector,
                                clause,
                                &query.attributes,
                            ),
                        )
                    })
                    .collect();
                let lists = fanout::collect(
                    action,
                    fanout::settle_batched(tasks, gateway.config.or_filter_batch_size).await,
                )?;

                let mut seen = HashSet::new();
                let mut merged: Vec<CanonicalResource> = lists
                    .into_iter()
                    .flat_map(|list| list.resources)
                    .filter(|resource| match resource.id() {
                        Some(id) => seen.insert(id.to_string()),
                        None => true,
                    })
                    .collect();

                let page = GetFilter::all()
                    .with_pagination(query.start_index, query.count, default_count)
                    .with_sort(query.sort_by.as_deref(), query.sort_order.as_deref());
                page.sort(&mut merged);
                let total = merged.len();
                let skip = page.start_index.unwrap_or(1) - 1;
                let paged: Vec<CanonicalResource> = match page.count {
                    Some(count) => merged.into_iter().skip(skip).take(count).collect(),
                    None => merged.into_iter().skip(skip).collect(),
                };
                (paged, Some(total), page.start_index)
            }
        };

    if wants_user_groups(gateway, context, kind) {
        attach_user_groups(gateway, context, &mut resources).await?;
    }

    let encoded = resources
        .iter()
        .map(|resource| gateway.encode(context, kind, resource, true))
        .collect();
    Ok(GatewayResponse::ok(
        list_envelope(context.version, encoded, total_results, start_index),
        &context.request_id,
    ))
}
