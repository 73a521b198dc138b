//! Protocol generations, discovery documents and routing errors.

use crate::common::builders::{UserBuilder, group};
use crate::common::{
    TENANT, body, config_from, create, create_gateway_with, create_test_gateway, path,
    relation_ids, send, test_config_json,
};
use scim_gateway::{GatewayRequest, InMemoryConnector, ResourceKind};
use serde_json::json;

#[tokio::test]
async fn test_v1_errors_use_legacy_envelope() {
    let (gateway, _connector) = create_test_gateway();
    let user = UserBuilder::new("dup")
        .with_email("work", "a@example.com")
        .with_email("work", "b@example.com")
        .build();

    let collision = send(&gateway, GatewayRequest::post(path("v1/Users"), user)).await;

    assert_eq!(collision.status, 500);
    let error = body(&collision);
    assert_eq!(error["Errors"][0]["code"], "500");
    assert!(error["Errors"][0]["description"]
        .as_str()
        .unwrap()
        .contains("emails"));

    let missing = send(&gateway, GatewayRequest::get(path("v1/Users/nobody"))).await;
    assert_eq!(missing.status, 404);
    assert_eq!(body(&missing)["Errors"][0]["code"], "404");
}

#[tokio::test]
async fn test_v1_resources_use_v1_schemas() {
    let (gateway, _connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::new("legacy").build()).await;

    let response = send(&gateway, GatewayRequest::get(path(&format!("v1/Users/{}", id)))).await;

    assert_eq!(response.status, 200);
    let user = body(&response);
    assert_eq!(user["schemas"][0], "urn:scim:schemas:core:1.0");
    assert_eq!(
        user["meta"]["location"],
        format!("https://gw.example.com/{}/v1/Users/{}", TENANT, id)
    );

    let list = send(&gateway, GatewayRequest::get(path("v1/Users"))).await;
    assert_eq!(body(&list)["schemas"][0], "urn:scim:schemas:core:1.0");
}

#[tokio::test]
async fn test_v1_patch_with_operation_delete_and_meta_attributes() {
    let (gateway, connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::rocky().build()).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("v1/Users/{}", id)),
            json!({
                "emails": [{"type": "home", "value": "rocky@home.example.com", "operation": "delete"}],
                "meta": {"attributes": ["title"]}
            }),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let stored = connector.stored(TENANT, ResourceKind::User, &id).await.unwrap();
    assert!(!stored.multi_valued["emails"].contains_key("home"));
    assert!(stored.multi_valued["emails"].contains_key("work"));
    assert!(stored.get_str("title").is_none());
}

#[tokio::test]
async fn test_group_members_patch() {
    let (gateway, connector) = create_test_gateway();
    let a = create(&gateway, "Users", UserBuilder::new("a").build()).await;
    let b = create(&gateway, "Users", UserBuilder::new("b").build()).await;
    let team = create(&gateway, "Groups", group("Team", &[&a])).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Groups/{}", team)),
            json!({
                "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
                "Operations": [
                    {"op": "add", "path": "members", "value": [{"value": b}]},
                    {"op": "remove", "path": format!("members[value eq \"{}\"]", a)}
                ]
            }),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(relation_ids(body(&response), "members"), vec![b.clone()]);
    assert_eq!(connector.calls_to("modifyGroup").await.len(), 1);
}

#[tokio::test]
async fn test_location_can_be_disabled() {
    let mut config = test_config_json();
    config["includeLocation"] = json!(false);
    let (gateway, _connector) = create_gateway_with(config_from(config), InMemoryConnector::new());

    let response = send(
        &gateway,
        GatewayRequest::post(path("Users"), UserBuilder::new("quiet").build()),
    )
    .await;

    assert_eq!(response.status, 201);
    assert!(response.location.is_none());
    let user = body(&response);
    assert_eq!(user["meta"]["resourceType"], "User");
    assert!(user["meta"].get("location").is_none());
}

#[tokio::test]
async fn test_service_provider_config() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(&gateway, GatewayRequest::get(path("ServiceProviderConfig"))).await;

    assert_eq!(response.status, 200);
    let config = body(&response);
    assert_eq!(config["patch"]["supported"], true);
    assert_eq!(config["bulk"]["supported"], false);
    assert_eq!(config["sort"]["supported"], true);
    let schemes = config["authenticationSchemes"].as_array().unwrap();
    assert_eq!(schemes.len(), 2);
    assert_eq!(schemes[0]["type"], "httpbasic");
    assert_eq!(schemes[0]["primary"], true);
    assert_eq!(schemes[1]["type"], "oauthbearertoken");

    let anonymous = gateway
        .handle(GatewayRequest::get(path("ServiceProviderConfig")))
        .await;
    assert_eq!(anonymous.status, 401);
}

#[tokio::test]
async fn test_resource_types() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(&gateway, GatewayRequest::get(path("ResourceTypes"))).await;

    assert_eq!(response.status, 200);
    let types = body(&response);
    assert_eq!(types["totalResults"], 2);
    assert_eq!(types["Resources"][0]["name"], "User");
    assert_eq!(types["Resources"][1]["endpoint"], "/Groups");
}

#[tokio::test]
async fn test_routing_errors() {
    let (gateway, _connector) = create_test_gateway();

    let unknown = send(&gateway, GatewayRequest::get(path("Widgets"))).await;
    assert_eq!(unknown.status, 404);

    let not_allowed = send(&gateway, GatewayRequest::delete(path("Users"))).await;
    assert_eq!(not_allowed.status, 405);

    let not_object = send(&gateway, GatewayRequest::post(path("Users"), json!(["x"]))).await;
    assert_eq!(not_object.status, 400);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(
        &gateway,
        GatewayRequest::get(path("Users")).with_request_id("req-42"),
    )
    .await;

    assert_eq!(response.request_id, "req-42");
}

#[tokio::test]
async fn test_legacy_patch_body_on_default_route() {
    let (gateway, _connector) = create_test_gateway();
    let user = UserBuilder::new("r")
        .with("name", json!({"givenName": "Bob", "familyName": "Balboa"}))
        .build();
    let id = create(&gateway, "Users", user).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Users/{}", id)),
            json!({
                "name": {"givenName": "Rocky"},
                "meta": {"attributes": ["name.familyName"]}
            }),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let user = body(&response);
    assert_eq!(user["name"]["givenName"], "Rocky");
    assert!(user["name"].get("familyName").is_none());
    assert_eq!(user["schemas"][0], "urn:ietf:params:scim:schemas:core:2.0:User");
}
