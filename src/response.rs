//! Response envelopes.
//!
//! [`GatewayResponse`] is what the gateway hands back to the transport: an HTTP status,
//! an optional JSON body and the `Location` of a created resource. List and error bodies
//! follow the envelope of the protocol version in effect.

use crate::error::GatewayError;
use crate::version::{ScimVersion, V2_ERROR_SCHEMA};
use serde_json::{Map, Value, json};

/// Transport-agnostic response produced for every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body, absent for `204 No Content`
    pub body: Option<Value>,
    /// `Location` header for created resources
    pub location: Option<String>,
    /// Aggregated sub-operation failures when the primary operation still succeeded
    pub partial_failure: Option<String>,
    /// Request ID for tracing
    pub request_id: String,
}

impl GatewayResponse {
    pub fn new(status: u16, body: Option<Value>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            body,
            location: None,
            partial_failure: None,
            request_id: request_id.into(),
        }
    }

    pub fn ok(body: Value, request_id: impl Into<String>) -> Self {
        Self::new(200, Some(body), request_id)
    }

    pub fn created(body: Value, location: Option<String>, request_id: impl Into<String>) -> Self {
        Self {
            location,
            ..Self::new(201, Some(body), request_id)
        }
    }

    pub fn no_content(request_id: impl Into<String>) -> Self {
        Self::new(204, None, request_id)
    }

    /// Error response rendered in the envelope of `version`.
    pub fn error(error: &GatewayError, version: ScimVersion, request_id: impl Into<String>) -> Self {
        let status = error.status(version);
        Self::new(status, Some(error_envelope(error, status, version)), request_id)
    }

    pub fn with_partial_failure(mut self, partial_failure: Option<String>) -> Self {
        self.partial_failure = partial_failure;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error body: `{Errors:[{description, code}]}` for version 1, the `Error` message
/// schema for version 2.
pub fn error_envelope(error: &GatewayError, status: u16, version: ScimVersion) -> Value {
    let detail = error.to_string();
    match version {
        ScimVersion::V1 => json!({
            "Errors": [{
                "description": detail,
                "code": status.to_string(),
            }]
        }),
        ScimVersion::V2 => {
            let mut body = Map::new();
            body.insert("schemas".to_string(), json!([V2_ERROR_SCHEMA]));
            if let Some(scim_type) = error.scim_type() {
                body.insert("scimType".to_string(), json!(scim_type));
            }
            body.insert("detail".to_string(), json!(detail));
            body.insert("status".to_string(), json!(status.to_string()));
            Value::Object(body)
        }
    }
}

/// List body with pagination metadata.
///
/// `total_results` falls back to the number of returned resources when the connector
/// did not report a total.
pub fn list_envelope(
    version: ScimVersion,
    resources: Vec<Value>,
    total_results: Option<usize>,
    start_index: Option<usize>,
) -> Value {
    let items_per_page = resources.len();
    json!({
        "schemas": [version.list_schema()],
        "totalResults": total_results.unwrap_or(items_per_page),
        "itemsPerPage": items_per_page,
        "startIndex": start_index.unwrap_or(1),
        "Resources": resources,
    })
}
