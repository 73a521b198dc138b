//! CRUD operation handlers
//!
//! Create, modify (PATCH) and delete, plus the user↔group membership fan-out they share
//! with replace. When membership is stored on groups, a user's `groups` never reach the
//! user calls of the connector; they become one membership call per group instead.

use crate::codec::{decode_body, to_canonical};
use crate::connector::{
    Connector, ConnectorResult, MODIFY_GROUP_MEMBERS, Verb, action_name, create_resource,
    delete_resource, modify_resource,
};
use crate::error::{CodecError, GatewayError, GatewayResult};
use crate::gateway::core::{HandlerContext, ScimGateway};
use crate::gateway::fanout::{self, Settled};
use crate::gateway::handlers::query::{attach_user_groups, fetch_resource, user_groups};
use crate::model::{CanonicalResource, MemberRef, ResourceKind};
use crate::response::GatewayResponse;
use log::{error, info, warn};
use serde_json::Value;

async fn change_membership<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    group_id: String,
    reference: MemberRef,
) -> ConnectorResult<()> {
    gateway
        .connector
        .modify_group_members(&context.connector, &group_id, &[reference])
        .await
}

/// Add the user to `to_add` and remove it from `to_revoke`, all concurrently.
///
/// Outcomes are returned adds first, each list in input order.
pub(crate) async fn update_memberships<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    user_id: &str,
    to_add: &[String],
    to_revoke: &[String],
) -> Vec<Settled<()>> {
    let adds = to_add.iter().map(|group| {
        (
            format!("add {} to group {}", user_id, group),
            change_membership(gateway, context, group.clone(), MemberRef::add(user_id)),
        )
    });
    let revokes = to_revoke.iter().map(|group| {
        (
            format!("revoke {} from group {}", user_id, group),
            change_membership(gateway, context, group.clone(), MemberRef::delete(user_id)),
        )
    });
    fanout::settle_all(adds.chain(revokes).collect()).await
}

fn require_identity(kind: ResourceKind, resource: &CanonicalResource) -> Result<(), CodecError> {
    let attributes = kind.identifying_attributes();
    let present = attributes
        .iter()
        .any(|attribute| resource.get_str(attribute).is_some_and(|v| !v.is_empty()));
    if present {
        Ok(())
    } else {
        Err(CodecError::MissingAttribute {
            attribute: attributes.join(" or "),
        })
    }
}

fn location(context: &HandlerContext, id: &str) -> Option<String> {
    context
        .location_base
        .as_ref()
        .map(|base| format!("{}/{}", base.trim_end_matches('/'), urlencoding::encode(id)))
}

/// Handle `POST /{endpoint}`.
pub async fn handle_create<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    body: Value,
) -> GatewayResult<GatewayResponse> {
    let mut resource = to_canonical(&body, &gateway.catalog)?;
    resource.id = None;
    require_identity(kind, &resource)?;

    let requested_groups = if kind == ResourceKind::User && gateway.derives_user_groups() {
        resource.cleared.remove("groups");
        resource.relations.remove("groups").unwrap_or_default()
    } else {
        Vec::new()
    };

    let action = action_name(Verb::Create, kind);
    let mut created = create_resource(gateway.connector.as_ref(), kind, &context.connector, &resource)
        .await
        .map_err(|e| GatewayError::connector(action, e))?;
    let id = created.id().map(String::from).ok_or_else(|| GatewayError::Connector {
        action: action.to_string(),
        message: "connector returned no id".to_string(),
    })?;
    info!(
        "Created {} '{}' in tenant '{}' (request: '{}')",
        kind.resource_type(),
        id,
        context.connector.tenant,
        context.request_id
    );

    let mut partial_failure = None;
    let additions: Vec<MemberRef> = requested_groups
        .into_iter()
        .filter(|group| !group.is_delete())
        .collect();
    if !additions.is_empty() {
        let group_ids: Vec<String> = additions.iter().map(|g| g.value.clone()).collect();
        let settled = update_memberships(gateway, context, &id, &group_ids, &[]).await;
        let failed = fanout::failures(&settled);
        if !failed.is_empty() {
            let aggregate = GatewayError::PartialFailure {
                action: action.to_string(),
                failures: failed,
            };
            error!("{} (request: '{}')", aggregate, context.request_id);
            partial_failure = Some(aggregate.to_string());
        }
        let joined: Vec<MemberRef> = additions
            .into_iter()
            .zip(&settled)
            .filter(|(_, (_, outcome))| outcome.is_ok())
            .map(|(group, _)| MemberRef {
                operation: None,
                ..group
            })
            .collect();
        created.relations.insert("groups".to_string(), joined);
    }

    Ok(GatewayResponse::created(
        gateway.encode(context, kind, &created, false),
        location(context, &id),
        &context.request_id,
    )
    .with_partial_failure(partial_failure))
}

/// Handle `PATCH /{endpoint}/{id}` in either protocol generation.
pub async fn handle_modify<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    id: &str,
    body: Value,
) -> GatewayResult<GatewayResponse> {
    let mut patch = decode_body(&body, &gateway.catalog)?;
    patch.id = None;
    let action = action_name(Verb::Modify, kind);
    let derives_groups = kind == ResourceKind::User && gateway.derives_user_groups();

    let mut to_add = Vec::new();
    let mut to_revoke = Vec::new();
    if derives_groups {
        let clear_all = patch.cleared.remove("groups");
        for reference in patch.relations.remove("groups").unwrap_or_default() {
            if reference.is_delete() {
                to_revoke.push(reference.value);
            } else {
                to_add.push(reference.value);
            }
        }
        if clear_all {
            let current = user_groups(gateway, context, id.to_string())
                .await
                .map_err(|e| GatewayError::connector(action_name(Verb::Get, ResourceKind::Group), e))?;
            for group in current {
                if !to_add.contains(&group.value) && !to_revoke.contains(&group.value) {
                    to_revoke.push(group.value);
                }
            }
        }
    }

    if !patch.is_empty() {
        modify_resource(gateway.connector.as_ref(), kind, &context.connector, id, &patch)
            .await
            .map_err(|e| GatewayError::connector(action, e))?;
    } else if !to_add.is_empty() || !to_revoke.is_empty() {
        fetch_resource(gateway, context, kind, id, &[], &[]).await?;
    }

    if !to_add.is_empty() || !to_revoke.is_empty() {
        let settled = update_memberships(gateway, context, id, &to_add, &to_revoke).await;
        fanout::collect(MODIFY_GROUP_MEMBERS, settled)?;
    }
    info!(
        "Modified {} '{}' (request: '{}')",
        kind.resource_type(),
        id,
        context.request_id
    );

    let mut resource = fetch_resource(gateway, context, kind, id, &[], &[]).await?;
    if derives_groups {
        attach_user_groups(gateway, context, std::slice::from_mut(&mut resource)).await?;
    }
    Ok(GatewayResponse::ok(
        gateway.encode(context, kind, &resource, true),
        &context.request_id,
    ))
}

/// Handle `DELETE /{endpoint}/{id}`.
///
/// A user's group memberships are revoked first, best-effort.
pub async fn handle_delete<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
    kind: ResourceKind,
    id: &str,
) -> GatewayResult<GatewayResponse> {
    if kind == ResourceKind::User && gateway.derives_user_groups() {
        match user_groups(gateway, context, id.to_string()).await {
            Ok(groups) => {
                let group_ids: Vec<String> = groups.into_iter().map(|g| g.value).collect();
                let settled = update_memberships(gateway, context, id, &[], &group_ids).await;
                let failed = fanout::failures(&settled);
                if !failed.is_empty() {
                    warn!(
                        "Revoking memberships of user '{}' partly failed: {} (request: '{}')",
                        id,
                        failed.join("; "),
                        context.request_id
                    );
                }
            }
            Err(e) => warn!(
                "Could not look up groups of user '{}' before delete: {} (request: '{}')",
                id, e, context.request_id
            ),
        }
    }

    let action = action_name(Verb::Delete, kind);
    delete_resource(gateway.connector.as_ref(), kind, &context.connector, id)
        .await
        .map_err(|e| GatewayError::connector(action, e))?;
    info!(
        "Deleted {} '{}' (request: '{}')",
        kind.resource_type(),
        id,
        context.request_id
    );
    Ok(GatewayResponse::no_content(&context.request_id))
}
