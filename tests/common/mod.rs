//! Common test utilities for the gateway integration suite.
//!
//! Gateways are built over a shared [`InMemoryConnector`] so tests can seed data,
//! inject failures and inspect the calls a request produced.

#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose};
use scim_gateway::{
    GatewayConfig, GatewayRequest, GatewayResponse, InMemoryConnector, ScimGateway,
};
use serde_json::{Value, json};

pub mod builders;

pub const TENANT: &str = "t1";
pub const ADMIN_USER: &str = "gwadmin";
pub const ADMIN_PASSWORD: &str = "password";
pub const READER_USER: &str = "reader";
pub const READER_PASSWORD: &str = "readonly";
pub const OAUTH_CLIENT: &str = "provisioner";
pub const OAUTH_SECRET: &str = "client-secret";
pub const STATIC_TOKEN: &str = "static-token";

/// Route `log` output through env_logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Configuration used by most tests: one admin, one read-only credential restricted
/// to [`TENANT`], a static bearer token, one OAuth client and no throttling delay.
pub fn test_config_json() -> Value {
    json!({
        "baseUrl": "https://gw.example.com",
        "auth": {
            "basic": [
                {"username": ADMIN_USER, "password": ADMIN_PASSWORD},
                {"username": READER_USER, "password": READER_PASSWORD,
                 "readOnly": true, "tenants": [TENANT]}
            ],
            "bearerToken": [{"token": STATIC_TOKEN}],
            "bearerOAuth": [
                {"clientId": OAUTH_CLIENT, "clientSecret": OAUTH_SECRET, "expiresIn": 600}
            ],
            "throttle": {"failureThreshold": 100, "failureDelayMs": 0}
        }
    })
}

pub fn config_from(value: Value) -> GatewayConfig {
    GatewayConfig::from_json_str(&value.to_string()).expect("test configuration is valid")
}

pub fn test_config() -> GatewayConfig {
    config_from(test_config_json())
}

/// Gateway plus a handle on its connector; both share the same store.
pub fn create_test_gateway() -> (ScimGateway<InMemoryConnector>, InMemoryConnector) {
    create_gateway_with(test_config(), InMemoryConnector::new())
}

pub fn create_gateway_with(
    config: GatewayConfig,
    connector: InMemoryConnector,
) -> (ScimGateway<InMemoryConnector>, InMemoryConnector) {
    init_logging();
    let gateway = ScimGateway::new(config, connector.clone()).expect("gateway builds");
    (gateway, connector)
}

pub fn basic_header(user: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", user, password))
    )
}

pub fn admin() -> String {
    basic_header(ADMIN_USER, ADMIN_PASSWORD)
}

pub fn path(suffix: &str) -> String {
    format!("/{}/{}", TENANT, suffix.trim_start_matches('/'))
}

/// Send a request as the admin credential.
pub async fn send(
    gateway: &ScimGateway<InMemoryConnector>,
    request: GatewayRequest,
) -> GatewayResponse {
    gateway.handle(request.with_authorization(admin())).await
}

pub fn body(response: &GatewayResponse) -> &Value {
    response
        .body
        .as_ref()
        .unwrap_or_else(|| panic!("response {} has no body", response.status))
}

/// Create a resource through the gateway and return its id.
pub async fn create(
    gateway: &ScimGateway<InMemoryConnector>,
    endpoint: &str,
    resource: Value,
) -> String {
    let response = send(gateway, GatewayRequest::post(path(endpoint), resource)).await;
    assert_eq!(response.status, 201, "create failed: {:?}", response.body);
    body(&response)["id"]
        .as_str()
        .expect("created resource has an id")
        .to_string()
}

pub async fn get(
    gateway: &ScimGateway<InMemoryConnector>,
    endpoint: &str,
    id: &str,
) -> GatewayResponse {
    send(gateway, GatewayRequest::get(path(&format!("{}/{}", endpoint, id)))).await
}

/// Ids of a relation attribute in a rendered resource, sorted.
pub fn relation_ids(resource: &Value, attribute: &str) -> Vec<String> {
    let mut ids: Vec<String> = resource[attribute]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["value"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Element of a multi-valued attribute with the given `type`.
pub fn typed_entry<'a>(resource: &'a Value, attribute: &str, type_key: &str) -> Option<&'a Value> {
    resource[attribute]
        .as_array()?
        .iter()
        .find(|item| item["type"] == type_key)
}
