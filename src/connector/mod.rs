//! Backend connector contract.
//!
//! A connector knows nothing about the wire protocol: it receives canonical resources,
//! parsed filters and relation edits, and reports failures as [`ConnectorError`]. Only
//! a duplicate is distinguished ([`ConnectorError::Conflict`]) and a missing resource
//! ([`ConnectorError::NotFound`]); anything else is an opaque message the orchestrator
//! wraps with the action name.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so implementations
//! can be driven from multi-threaded runtimes.

pub mod in_memory;

pub use in_memory::{InMemoryConnector, ReceivedQuery};

use crate::filter::GetFilter;
use crate::model::{CanonicalResource, MemberRef, ResourceKind};
use std::future::Future;

/// Errors reported by connectors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The resource already exists
    #[error("{0}")]
    Conflict(String),
    /// The addressed resource does not exist
    #[error("{0}")]
    NotFound(String),
    /// Anything else
    #[error("{0}")]
    Failed(String),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Per-request facts handed to every connector call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectorContext {
    pub tenant: String,
    pub request_id: String,
    /// Authenticated principal
    pub principal: String,
    /// Caller's raw `Authorization` value when pass-through is in effect
    pub passthrough: Option<String>,
}

impl ConnectorContext {
    pub fn new(tenant: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceList {
    pub resources: Vec<CanonicalResource>,
    /// Total matches before pagination, when the backend knows it
    pub total_results: Option<usize>,
}

impl ResourceList {
    pub fn new(resources: Vec<CanonicalResource>) -> Self {
        Self {
            resources,
            total_results: None,
        }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total_results = Some(total);
        self
    }
}

/// Operations a backend must provide.
pub trait Connector: Send + Sync {
    /// `attributes` is the client's inclusion list. Exclusions, ordering and
    /// pagination arrive on `filter`; the gateway projects the response either way.
    fn get_users(
        &self,
        context: &ConnectorContext,
        filter: &GetFilter,
        attributes: &[String],
    ) -> impl Future<Output = ConnectorResult<ResourceList>> + Send;

    /// Returns the created user including its connector-assigned `id`.
    fn create_user(
        &self,
        context: &ConnectorContext,
        user: &CanonicalResource,
    ) -> impl Future<Output = ConnectorResult<CanonicalResource>> + Send;

    fn modify_user(
        &self,
        context: &ConnectorContext,
        id: &str,
        patch: &CanonicalResource,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    fn delete_user(
        &self,
        context: &ConnectorContext,
        id: &str,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    fn get_groups(
        &self,
        context: &ConnectorContext,
        filter: &GetFilter,
        attributes: &[String],
    ) -> impl Future<Output = ConnectorResult<ResourceList>> + Send;

    fn create_group(
        &self,
        context: &ConnectorContext,
        group: &CanonicalResource,
    ) -> impl Future<Output = ConnectorResult<CanonicalResource>> + Send;

    fn modify_group(
        &self,
        context: &ConnectorContext,
        id: &str,
        patch: &CanonicalResource,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    fn delete_group(
        &self,
        context: &ConnectorContext,
        id: &str,
    ) -> impl Future<Output = ConnectorResult<()>> + Send;

    /// Add or remove group members; each reference carries its own operation.
    fn modify_group_members(
        &self,
        context: &ConnectorContext,
        group_id: &str,
        members: &[MemberRef],
    ) -> impl Future<Output = ConnectorResult<()>> + Send;
}

/// Connector verb, used to name actions in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Modify,
    Delete,
}

/// Action name such as `getUsers` or `modifyGroup`.
pub fn action_name(verb: Verb, kind: ResourceKind) -> &'static str {
    match (verb, kind) {
        (Verb::Get, ResourceKind::User) => "getUsers",
        (Verb::Get, ResourceKind::Group) => "getGroups",
        (Verb::Create, ResourceKind::User) => "createUser",
        (Verb::Create, ResourceKind::Group) => "createGroup",
        (Verb::Modify, ResourceKind::User) => "modifyUser",
        (Verb::Modify, ResourceKind::Group) => "modifyGroup",
        (Verb::Delete, ResourceKind::User) => "deleteUser",
        (Verb::Delete, ResourceKind::Group) => "deleteGroup",
    }
}

pub const MODIFY_GROUP_MEMBERS: &str = "modifyGroupMembers";

/// Dispatch of the fixed capability set over the resource kind.
pub async fn get_resources<C: Connector>(
    connector: &C,
    kind: ResourceKind,
    context: &ConnectorContext,
    filter: &GetFilter,
    attributes: &[String],
) -> ConnectorResult<ResourceList> {
    match kind {
        ResourceKind::User => connector.get_users(context, filter, attributes).await,
        ResourceKind::Group => connector.get_groups(context, filter, attributes).await,
    }
}

pub async fn create_resource<C: Connector>(
    connector: &C,
    kind: ResourceKind,
    context: &ConnectorContext,
    resource: &CanonicalResource,
) -> ConnectorResult<CanonicalResource> {
    match kind {
        ResourceKind::User => connector.create_user(context, resource).await,
        ResourceKind::Group => connector.create_group(context, resource).await,
    }
}

pub async fn modify_resource<C: Connector>(
    connector: &C,
    kind: ResourceKind,
    context: &ConnectorContext,
    id: &str,
    patch: &CanonicalResource,
) -> ConnectorResult<()> {
    match kind {
        ResourceKind::User => connector.modify_user(context, id, patch).await,
        ResourceKind::Group => connector.modify_group(context, id, patch).await,
    }
}

pub async fn delete_resource<C: Connector>(
    connector: &C,
    kind: ResourceKind,
    context: &ConnectorContext,
    id: &str,
) -> ConnectorResult<()> {
    match kind {
        ResourceKind::User => connector.delete_user(context, id).await,
        ResourceKind::Group => connector.delete_group(context, id).await,
    }
}
