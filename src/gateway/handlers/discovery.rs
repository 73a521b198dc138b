//! Discovery endpoints: `ServiceProviderConfig` and `ResourceTypes`.

use crate::auth::StrategyKind;
use crate::connector::Connector;
use crate::gateway::core::{HandlerContext, ScimGateway};
use crate::model::ResourceKind;
use crate::response::{GatewayResponse, list_envelope};
use crate::version::{
    ScimVersion, V1_CORE_SCHEMA, V2_RESOURCE_TYPE_SCHEMA, V2_SERVICE_PROVIDER_CONFIG_SCHEMA,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Authentication scheme advertised in the service provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticationScheme {
    /// Authentication scheme name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// URI for more information
    #[serde(rename = "specUri", skip_serializing_if = "Option::is_none")]
    pub spec_uri: Option<String>,
    /// Authentication type (e.g., "oauthbearertoken", "httpbasic")
    #[serde(rename = "type")]
    pub auth_type: String,
    /// Whether this scheme is the primary authentication method
    pub primary: bool,
}

impl AuthenticationScheme {
    fn http_basic() -> Self {
        Self {
            name: "HTTP Basic".to_string(),
            description: "Authentication scheme using the HTTP Basic Standard".to_string(),
            spec_uri: Some("http://www.rfc-editor.org/info/rfc2617".to_string()),
            auth_type: "httpbasic".to_string(),
            primary: false,
        }
    }

    fn bearer_token() -> Self {
        Self {
            name: "OAuth Bearer Token".to_string(),
            description: "Authentication scheme using the OAuth Bearer Token Standard".to_string(),
            spec_uri: Some("http://www.rfc-editor.org/info/rfc6750".to_string()),
            auth_type: "oauthbearertoken".to_string(),
            primary: false,
        }
    }
}

/// Schemes for the configured strategies, the first one marked primary.
pub fn authentication_schemes(kinds: &[StrategyKind]) -> Vec<AuthenticationScheme> {
    let mut schemes: Vec<AuthenticationScheme> = Vec::new();
    for kind in kinds {
        let scheme = match kind {
            StrategyKind::Basic => AuthenticationScheme::http_basic(),
            StrategyKind::BearerToken
            | StrategyKind::BearerJwt
            | StrategyKind::BearerJwtIssuer
            | StrategyKind::BearerOAuth => AuthenticationScheme::bearer_token(),
            StrategyKind::Anonymous | StrategyKind::PassThrough => continue,
        };
        if !schemes.iter().any(|s| s.auth_type == scheme.auth_type) {
            schemes.push(scheme);
        }
    }
    if let Some(first) = schemes.first_mut() {
        first.primary = true;
    }
    schemes
}

/// Handle `GET /ServiceProviderConfig`.
pub fn handle_service_provider_config<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
) -> GatewayResponse {
    let schema = match context.version {
        ScimVersion::V1 => V1_CORE_SCHEMA,
        ScimVersion::V2 => V2_SERVICE_PROVIDER_CONFIG_SCHEMA,
    };
    let body = json!({
        "schemas": [schema],
        "patch": {"supported": true},
        "bulk": {"supported": false, "maxOperations": 0, "maxPayloadSize": 0},
        "filter": {"supported": true, "maxResults": gateway.config.default_count},
        "changePassword": {"supported": true},
        "sort": {"supported": true},
        "etag": {"supported": false},
        "authenticationSchemes": authentication_schemes(&gateway.auth.kinds()),
    });
    GatewayResponse::ok(body, &context.request_id)
}

fn resource_type(version: ScimVersion, kind: ResourceKind, endpoint: &str) -> Value {
    let mut resource = json!({
        "schemas": [V2_RESOURCE_TYPE_SCHEMA],
        "id": kind.resource_type(),
        "name": kind.resource_type(),
        "endpoint": format!("/{}", endpoint),
        "description": match kind {
            ResourceKind::User => "User Account",
            ResourceKind::Group => "Group",
        },
        "schema": version.core_schema(kind),
    });
    if kind == ResourceKind::User {
        resource["schemaExtensions"] = json!([{
            "schema": version.enterprise_schema(),
            "required": false,
        }]);
    }
    resource
}

/// Handle `GET /ResourceTypes`.
pub fn handle_resource_types<C: Connector>(
    gateway: &ScimGateway<C>,
    context: &HandlerContext,
) -> GatewayResponse {
    let config = &gateway.config;
    let first = |aliases: &[String], fallback: &str| {
        aliases
            .first()
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };
    let resources = vec![
        resource_type(
            context.version,
            ResourceKind::User,
            &first(&config.user_endpoints, "Users"),
        ),
        resource_type(
            context.version,
            ResourceKind::Group,
            &first(&config.group_endpoints, "Groups"),
        ),
    ];
    GatewayResponse::ok(
        list_envelope(context.version, resources, None, None),
        &context.request_id,
    )
}
