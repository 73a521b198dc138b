//! Credential strategies, scope restrictions and the token endpoint.

use crate::common::builders::UserBuilder;
use crate::common::{
    OAUTH_CLIENT, OAUTH_SECRET, READER_PASSWORD, READER_USER, STATIC_TOKEN, basic_header, body,
    config_from, create_gateway_with, create_test_gateway, path, test_config_json,
};
use chrono::{Duration, Utc};
use scim_gateway::config::CredentialScope;
use scim_gateway::{GatewayConfig, GatewayRequest, HttpMethod, InMemoryConnector};
use serde_json::json;

fn token_request() -> GatewayRequest {
    GatewayRequest::new(HttpMethod::Post, path("oauth/token"))
}

#[tokio::test]
async fn test_missing_credentials_are_unauthenticated() {
    let (gateway, connector) = create_test_gateway();

    let response = gateway.handle(GatewayRequest::get(path("Users"))).await;

    assert_eq!(response.status, 401);
    assert!(connector.calls().await.is_empty());
}

#[tokio::test]
async fn test_wrong_password_is_unauthenticated() {
    let (gateway, _connector) = create_test_gateway();

    let response = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization(basic_header(READER_USER, "nope")))
        .await;

    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn test_read_only_credential_cannot_write() {
    let (gateway, connector) = create_test_gateway();
    let reader = basic_header(READER_USER, READER_PASSWORD);

    let read = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization(reader.clone()))
        .await;
    assert_eq!(read.status, 200);

    let write = gateway
        .handle(
            GatewayRequest::post(path("Users"), UserBuilder::new("blocked").build())
                .with_authorization(reader),
        )
        .await;
    assert_eq!(write.status, 403);
    assert!(connector.calls_to("createUser").await.is_empty());
}

#[tokio::test]
async fn test_tenant_restricted_credential() {
    let (gateway, _connector) = create_test_gateway();

    let response = gateway
        .handle(
            GatewayRequest::get("/other-tenant/Users")
                .with_authorization(basic_header(READER_USER, READER_PASSWORD)),
        )
        .await;

    assert_eq!(response.status, 403);
    assert!(body(&response)["detail"]
        .as_str()
        .unwrap()
        .contains("other-tenant"));
}

#[tokio::test]
async fn test_static_bearer_token() {
    let (gateway, _connector) = create_test_gateway();

    let accepted = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization(format!("Bearer {}", STATIC_TOKEN)))
        .await;
    let rejected = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization("Bearer unknown"))
        .await;

    assert_eq!(accepted.status, 200);
    assert_eq!(rejected.status, 401);
}

#[tokio::test]
async fn test_issue_token_with_form_body_and_use_it() {
    let (gateway, _connector) = create_test_gateway();

    let response = gateway
        .handle(token_request().with_form(format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            OAUTH_CLIENT, OAUTH_SECRET
        )))
        .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let grant = body(&response);
    assert_eq!(grant["token_type"], "Bearer");
    assert_eq!(grant["expires_in"], 600);
    let token = grant["access_token"].as_str().unwrap();

    let list = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization(format!("Bearer {}", token)))
        .await;
    assert_eq!(list.status, 200);
}

#[tokio::test]
async fn test_issue_token_with_json_body_or_basic_header() {
    let (gateway, _connector) = create_test_gateway();

    let json_body = gateway
        .handle(token_request().with_json(json!({
            "grant_type": "client_credentials",
            "client_id": OAUTH_CLIENT,
            "client_secret": OAUTH_SECRET,
        })))
        .await;
    assert_eq!(json_body.status, 200);

    let header = gateway
        .handle(
            token_request()
                .with_form("grant_type=client_credentials")
                .with_authorization(basic_header(OAUTH_CLIENT, OAUTH_SECRET)),
        )
        .await;
    assert_eq!(header.status, 200);
    assert_eq!(gateway.auth().state().tokens.len().await, 2);
}

#[tokio::test]
async fn test_token_endpoint_errors() {
    let (gateway, _connector) = create_test_gateway();

    let missing_grant = gateway
        .handle(token_request().with_form(format!("client_id={}", OAUTH_CLIENT)))
        .await;
    assert_eq!(missing_grant.status, 400);

    let wrong_grant = gateway
        .handle(token_request().with_form("grant_type=password&username=a&password=b"))
        .await;
    assert_eq!(wrong_grant.status, 400);
    assert!(body(&wrong_grant)["detail"]
        .as_str()
        .unwrap()
        .contains("password"));

    let bad_secret = gateway
        .handle(token_request().with_form(format!(
            "grant_type=client_credentials&client_id={}&client_secret=wrong",
            OAUTH_CLIENT
        )))
        .await;
    assert_eq!(bad_secret.status, 401);

    let wrong_method = gateway
        .handle(GatewayRequest::get(path("oauth/token")))
        .await;
    assert_eq!(wrong_method.status, 405);
}

#[tokio::test]
async fn test_expired_token_is_reported_as_expired() {
    let (gateway, _connector) = create_test_gateway();
    gateway
        .auth()
        .state()
        .tokens
        .insert(
            "stale-token",
            OAUTH_CLIENT,
            CredentialScope::default(),
            Utc::now() - Duration::seconds(5),
        )
        .await;

    let response = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization("Bearer stale-token"))
        .await;

    assert_eq!(response.status, 401);
    assert!(body(&response)["detail"]
        .as_str()
        .unwrap()
        .contains("Token expired"));

    // Expired entries are evicted on first sight.
    let again = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization("Bearer stale-token"))
        .await;
    assert_eq!(again.status, 401);
    assert!(!body(&again)["detail"]
        .as_str()
        .unwrap()
        .contains("Token expired"));
}

#[tokio::test]
async fn test_without_strategies_requests_are_anonymous() {
    let (gateway, _connector) =
        create_gateway_with(GatewayConfig::default(), InMemoryConnector::new());

    let response = gateway
        .handle(GatewayRequest::post(path("Users"), UserBuilder::new("anon").build()))
        .await;

    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_pass_through_forwards_headers_it_cannot_parse() {
    let mut config = test_config_json();
    config["auth"]["passThrough"] = json!({"enabled": true});
    let (gateway, connector) = create_gateway_with(config_from(config), InMemoryConnector::new());

    for header in ["Token", "Basic not-base64!"] {
        connector.clear_calls().await;
        let response = gateway
            .handle(GatewayRequest::get(path("Users")).with_authorization(header))
            .await;

        assert_eq!(response.status, 200, "{}: {:?}", header, response.body);
        let queries = connector.queries_to("getUsers").await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].passthrough.as_deref(), Some(header));
    }
}

#[tokio::test]
async fn test_scheme_only_header_is_unauthenticated_without_pass_through() {
    let (gateway, connector) = create_test_gateway();

    let response = gateway
        .handle(GatewayRequest::get(path("Users")).with_authorization("Token"))
        .await;

    assert_eq!(response.status, 401);
    assert!(connector.calls().await.is_empty());
}
