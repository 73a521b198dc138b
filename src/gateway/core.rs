//! Core gateway infrastructure
//!
//! The gateway owns the configuration, the connector, the authentication chain and the
//! router. [`ScimGateway::handle`] is the single entry point: it routes, authorizes and
//! dispatches a [`GatewayRequest`] and always resolves to a [`GatewayResponse`].

use super::errors::create_error_response;
use super::handlers;
use crate::auth::{AuthChain, AuthRequest, AuthScope};
use crate::codec::{AttributeCatalog, EncodeOptions, to_wire};
use crate::config::{ConfigurationError, GatewayConfig, GroupMembership};
use crate::connector::{Connector, ConnectorContext};
use crate::error::{GatewayError, GatewayResult};
use crate::model::{CanonicalResource, ResourceKind};
use crate::response::GatewayResponse;
use crate::router::{Endpoint, HttpMethod, QueryParams, ResourceOperation, RouteMatch, Router};
use crate::version::ScimVersion;
use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;

/// Framework-agnostic provisioning gateway.
pub struct ScimGateway<C: Connector> {
    pub(super) config: Arc<GatewayConfig>,
    pub(super) connector: Arc<C>,
    pub(super) auth: AuthChain,
    pub(super) router: Router,
    pub(super) catalog: AttributeCatalog,
}

impl<C: Connector> Clone for ScimGateway<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            auth: self.auth.clone(),
            router: self.router.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

/// Request body as received by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// `application/x-www-form-urlencoded` text
    Form(String),
}

/// Structured request, independent of any HTTP framework.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub method: HttpMethod,
    /// Path without the query string, e.g. `/t1/v2/Users/42`
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: String,
    /// Raw `Authorization` header
    pub authorization: Option<String>,
    /// Caller address, used to throttle repeated authentication failures
    pub remote_addr: Option<String>,
    pub body: Option<RequestBody>,
    /// Request ID for tracing and correlation
    pub request_id: Option<String>,
}

impl GatewayRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            authorization: None,
            remote_addr: None,
            body: None,
            request_id: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_json(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_json(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, path).with_json(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_form(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Form(body.into()));
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Per-request facts shared by the handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub request_id: String,
    pub version: ScimVersion,
    pub connector: ConnectorContext,
    /// Collection URL used for `meta.location` and `Location`, when disclosed
    pub location_base: Option<String>,
    pub query: QueryParams,
}

impl<C: Connector> ScimGateway<C> {
    /// Create a gateway from a validated configuration.
    pub fn new(config: GatewayConfig, connector: C) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let auth = AuthChain::from_config(&config.auth)?;
        let router = Router::from_config(&config);
        let catalog = AttributeCatalog::from_config(&config);
        info!(
            "SCIM gateway configured: version {:?}, membership {:?}, auth strategies [{}]",
            config.scim_version,
            config.group_membership,
            auth.kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            auth,
            router,
            catalog,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn auth(&self) -> &AuthChain {
        &self.auth
    }

    pub fn catalog(&self) -> &AttributeCatalog {
        &self.catalog
    }

    /// True when group membership is stored on groups and derived for users.
    pub(super) fn derives_user_groups(&self) -> bool {
        self.config.group_membership == GroupMembership::Members
    }

    /// Render a canonical resource for the response.
    pub(super) fn encode(
        &self,
        context: &HandlerContext,
        kind: ResourceKind,
        resource: &CanonicalResource,
        project: bool,
    ) -> Value {
        let mut options = EncodeOptions::new(context.version, kind);
        if let Some(base) = &context.location_base {
            options = options.with_location_base(base.clone());
        }
        if project {
            options = options.with_projection(
                context.query.attributes.clone(),
                context.query.excluded_attributes.clone(),
            );
        }
        to_wire(resource, &options)
    }

    /// Handle a request.
    ///
    /// Never fails: every error is rendered in the envelope of the protocol version in
    /// effect for the request.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            "SCIM gateway processing {} {} (request: '{}')",
            request.method, request.path, request_id
        );

        let route = match self.router.route(request.method, &request.path) {
            Ok(route) => route,
            Err(e) => return create_error_response(&e, self.config.scim_version, &request_id),
        };
        let version = route.version.unwrap_or(self.config.scim_version);

        let response = match self.dispatch(request, &route, version, &request_id).await {
            Ok(response) => response,
            Err(e) => return create_error_response(&e, version, &request_id),
        };

        debug!(
            "SCIM gateway completed with status {} (request: '{}')",
            response.status, request_id
        );
        response
    }

    async fn dispatch(
        &self,
        request: GatewayRequest,
        route: &RouteMatch,
        version: ScimVersion,
        request_id: &str,
    ) -> GatewayResult<GatewayResponse> {
        if route.endpoint == Endpoint::IssueToken {
            return handlers::token::handle_issue_token(self, request, route, request_id).await;
        }

        let scope = self
            .auth
            .authorize(&AuthRequest {
                authorization: request.authorization.as_deref(),
                method: request.method,
                tenant: &route.tenant,
                remote_addr: request.remote_addr.as_deref(),
            })
            .await?;

        let context = self.create_handler_context(&request, route, version, request_id, &scope)?;
        let body = request.body;

        match &route.endpoint {
            Endpoint::Resource { kind, operation } => {
                let kind = *kind;
                match operation {
                    ResourceOperation::List => {
                        handlers::query::handle_list(self, &context, kind).await
                    }
                    ResourceOperation::Get(id) => {
                        handlers::query::handle_get(self, &context, kind, id).await
                    }
                    ResourceOperation::Create => {
                        handlers::crud::handle_create(self, &context, kind, json_body(body)?).await
                    }
                    ResourceOperation::Modify(id) => {
                        handlers::crud::handle_modify(self, &context, kind, id, json_body(body)?)
                            .await
                    }
                    ResourceOperation::Replace(id) => {
                        handlers::replace::handle_replace(self, &context, kind, id, json_body(body)?)
                            .await
                    }
                    ResourceOperation::Delete(id) => {
                        handlers::crud::handle_delete(self, &context, kind, id).await
                    }
                }
            }
            Endpoint::ServiceProviderConfig => {
                Ok(handlers::discovery::handle_service_provider_config(self, &context))
            }
            Endpoint::ResourceTypes => Ok(handlers::discovery::handle_resource_types(self, &context)),
            Endpoint::IssueToken => Err(GatewayError::internal("token endpoint reached dispatch")),
        }
    }

    fn create_handler_context(
        &self,
        request: &GatewayRequest,
        route: &RouteMatch,
        version: ScimVersion,
        request_id: &str,
        scope: &AuthScope,
    ) -> GatewayResult<HandlerContext> {
        let query = QueryParams::parse(&request.query)?;
        let mut connector = ConnectorContext::new(route.tenant.clone(), request_id);
        connector.principal = scope.principal.clone();
        connector.passthrough = scope.passthrough.clone();

        Ok(HandlerContext {
            request_id: request_id.to_string(),
            version,
            connector,
            location_base: self
                .config
                .include_location
                .then(|| route.location_base(&self.config.base_url)),
            query,
        })
    }
}

fn json_body(body: Option<RequestBody>) -> GatewayResult<Value> {
    match body {
        Some(RequestBody::Json(value)) if value.is_object() => Ok(value),
        Some(RequestBody::Json(_)) => Err(GatewayError::invalid_request(
            "request body must be a JSON object",
        )),
        Some(RequestBody::Form(_)) => Err(GatewayError::invalid_request(
            "request body must be JSON",
        )),
        None => Err(GatewayError::invalid_request("missing request body")),
    }
}
