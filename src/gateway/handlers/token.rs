//! Token endpoint: `POST /{tenant}/oauth/token` with a `client_credentials` grant.
//!
//! Client id and secret come from the body (form or JSON) or from a Basic
//! `Authorization` header. The issued token is accepted by the bearer OAuth strategy
//! until it expires.

use crate::auth::{AuthError, Credential};
use crate::connector::Connector;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::core::{GatewayRequest, RequestBody, ScimGateway};
use crate::response::GatewayResponse;
use crate::router::RouteMatch;
use serde_json::Value;
use std::collections::HashMap;

const CLIENT_CREDENTIALS: &str = "client_credentials";

fn body_fields(body: Option<&RequestBody>) -> GatewayResult<HashMap<String, String>> {
    match body {
        Some(RequestBody::Form(form)) => Ok(url::form_urlencoded::parse(form.as_bytes())
            .into_owned()
            .collect()),
        Some(RequestBody::Json(Value::Object(map))) => Ok(map
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect()),
        Some(RequestBody::Json(_)) => Err(GatewayError::invalid_request(
            "token request body must be an object",
        )),
        None => Ok(HashMap::new()),
    }
}

/// Handle a token request.
pub async fn handle_issue_token<C: Connector>(
    gateway: &ScimGateway<C>,
    request: GatewayRequest,
    route: &RouteMatch,
    request_id: &str,
) -> GatewayResult<GatewayResponse> {
    let fields = body_fields(request.body.as_ref())?;

    match fields.get("grant_type").map(String::as_str) {
        None | Some("") => return Err(GatewayError::invalid_request("missing grant_type")),
        Some(CLIENT_CREDENTIALS) => {}
        Some(other) => {
            return Err(AuthError::UnsupportedGrant {
                grant_type: other.to_string(),
            }
            .into());
        }
    }

    let (client_id, client_secret) = match (fields.get("client_id"), fields.get("client_secret")) {
        (Some(id), Some(secret)) => (id.clone(), secret.clone()),
        _ => match request.authorization.as_deref().and_then(Credential::parse) {
            Some(Credential::Basic { username, password }) => (username, password),
            _ => return Err(AuthError::InvalidClient.into()),
        },
    };

    let grant = gateway
        .auth
        .issue_token(
            &client_id,
            &client_secret,
            &route.tenant,
            request.remote_addr.as_deref(),
        )
        .await?;
    Ok(GatewayResponse::ok(serde_json::to_value(&grant)?, request_id))
}
