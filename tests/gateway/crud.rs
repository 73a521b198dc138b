//! Create, get, PATCH and delete through the gateway.

use crate::common::builders::{UserBuilder, group, patch_op};
use crate::common::{
    TENANT, body, create, create_test_gateway, get, path, relation_ids, send, typed_entry,
};
use scim_gateway::{GatewayRequest, ResourceKind};
use serde_json::json;

#[tokio::test]
async fn test_create_user_returns_location_and_meta() {
    let (gateway, connector) = create_test_gateway();

    let response = send(
        &gateway,
        GatewayRequest::post(path("Users"), UserBuilder::rocky().build()),
    )
    .await;

    assert_eq!(response.status, 201);
    let created = body(&response);
    let id = created["id"].as_str().unwrap();
    let expected_location = format!("https://gw.example.com/{}/Users/{}", TENANT, id);
    assert_eq!(response.location.as_deref(), Some(expected_location.as_str()));
    assert_eq!(created["meta"]["location"], expected_location);
    assert_eq!(created["meta"]["resourceType"], "User");
    assert_eq!(created["schemas"][0], "urn:ietf:params:scim:schemas:core:2.0:User");
    assert_eq!(created["userName"], "rocky");
    assert_eq!(
        typed_entry(created, "emails", "home").unwrap()["value"],
        "rocky@home.example.com"
    );

    let stored = connector.stored(TENANT, ResourceKind::User, id).await.unwrap();
    assert_eq!(stored.multi_valued["emails"].len(), 2);
    assert!(!stored.relations.contains_key("groups"));
}

#[tokio::test]
async fn test_create_requires_identifying_attribute() {
    let (gateway, connector) = create_test_gateway();

    let response = send(
        &gateway,
        GatewayRequest::post(path("Users"), json!({"displayName": "Nobody"})),
    )
    .await;

    assert_eq!(response.status, 400);
    assert!(body(&response)["detail"]
        .as_str()
        .unwrap()
        .contains("userName or externalId"));
    assert!(connector.calls_to("createUser").await.is_empty());
}

#[tokio::test]
async fn test_duplicate_user_name_is_a_conflict() {
    let (gateway, _connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::new("bjensen").build()).await;

    let response = send(
        &gateway,
        GatewayRequest::post(path("Users"), UserBuilder::new("BJensen").build()),
    )
    .await;

    assert_eq!(response.status, 409);
    assert_eq!(body(&response)["scimType"], "uniqueness");
}

#[tokio::test]
async fn test_type_key_collision_is_rejected() {
    let (gateway, connector) = create_test_gateway();
    let user = UserBuilder::new("dup")
        .with_email("work", "a@example.com")
        .with_email("work", "b@example.com")
        .build();

    let response = send(&gateway, GatewayRequest::post(path("Users"), user)).await;

    assert_eq!(response.status, 400);
    let error = body(&response);
    assert_eq!(error["scimType"], "uniqueness");
    assert!(error["detail"].as_str().unwrap().contains("emails"));
    assert!(connector.calls().await.is_empty());
}

#[tokio::test]
async fn test_patch_rocky_scenario() {
    let (gateway, connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::rocky().build()).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Users/{}", id)),
            patch_op(json!([
                {"op": "replace", "path": "name.givenName", "value": "Robert"},
                {"op": "replace", "path": "emails[type eq \"work\"].value", "value": "robert@work.example.com"},
                {"op": "remove", "path": "emails[type eq \"home\"]"}
            ])),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let user = body(&response);
    assert_eq!(user["name"]["givenName"], "Robert");
    assert_eq!(user["name"]["familyName"], "Balboa");
    assert_eq!(user["title"], "Boxer");
    assert_eq!(
        typed_entry(user, "emails", "work").unwrap()["value"],
        "robert@work.example.com"
    );
    assert!(typed_entry(user, "emails", "home").is_none());

    let stored = connector.stored(TENANT, ResourceKind::User, &id).await.unwrap();
    assert!(!stored.multi_valued["emails"].contains_key("home"));
}

#[tokio::test]
async fn test_patch_blank_clears_but_absent_keeps() {
    let (gateway, _connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::rocky().build()).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Users/{}", id)),
            patch_op(json!([{"op": "replace", "value": {"title": ""}}])),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let user = body(&response);
    assert!(user.get("title").is_none());
    assert_eq!(user["name"]["familyName"], "Balboa");
    assert_eq!(user["active"], true);
}

#[tokio::test]
async fn test_patch_unknown_resource_is_not_found() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path("Users/missing"),
            patch_op(json!([{"op": "replace", "path": "title", "value": "x"}])),
        ),
    )
    .await;

    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_user_groups_are_derived_from_group_members() {
    let (gateway, _connector) = create_test_gateway();
    let user_id = create(&gateway, "Users", UserBuilder::new("member").build()).await;
    let group_id = create(&gateway, "Groups", group("Admins", &[&user_id])).await;

    let response = get(&gateway, "Users", &user_id).await;

    assert_eq!(response.status, 200);
    let user = body(&response);
    assert_eq!(relation_ids(user, "groups"), vec![group_id]);
    assert_eq!(user["groups"][0]["display"], "Admins");
}

#[tokio::test]
async fn test_create_user_with_groups_fans_out_membership() {
    let (gateway, connector) = create_test_gateway();
    let admins = create(&gateway, "Groups", group("Admins", &[])).await;
    let staff = create(&gateway, "Groups", group("Staff", &[])).await;

    let user = UserBuilder::new("joiner")
        .with_group(&admins)
        .with_group(&staff)
        .build();
    let response = send(&gateway, GatewayRequest::post(path("Users"), user)).await;

    assert_eq!(response.status, 201);
    assert!(response.partial_failure.is_none());
    let user_id = body(&response)["id"].as_str().unwrap().to_string();
    let mut expected = vec![admins.clone(), staff.clone()];
    expected.sort();
    assert_eq!(relation_ids(body(&response), "groups"), expected);

    // Membership lives on the groups, never on the user record.
    let stored = connector.stored(TENANT, ResourceKind::User, &user_id).await.unwrap();
    assert!(!stored.relations.contains_key("groups"));
    assert_eq!(connector.calls_to("modifyGroupMembers").await.len(), 2);
    let group = connector.stored(TENANT, ResourceKind::Group, &admins).await.unwrap();
    assert_eq!(group.relations["members"][0].value, user_id);
}

#[tokio::test]
async fn test_create_user_with_failing_group_is_partial_success() {
    let (gateway, _connector) = create_test_gateway();
    let admins = create(&gateway, "Groups", group("Admins", &[])).await;

    let user = UserBuilder::new("joiner")
        .with_group(&admins)
        .with_group("no-such-group")
        .build();
    let response = send(&gateway, GatewayRequest::post(path("Users"), user)).await;

    assert_eq!(response.status, 201);
    let failure = response.partial_failure.as_deref().unwrap();
    assert!(failure.starts_with("createUser error:"));
    assert!(failure.contains("no-such-group"));
    assert_eq!(relation_ids(body(&response), "groups"), vec![admins]);
}

#[tokio::test]
async fn test_patch_adds_and_removes_group_membership() {
    let (gateway, connector) = create_test_gateway();
    let user_id = create(&gateway, "Users", UserBuilder::new("mover").build()).await;
    let old = create(&gateway, "Groups", group("Old", &[&user_id])).await;
    let new = create(&gateway, "Groups", group("New", &[])).await;
    connector.clear_calls().await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Users/{}", user_id)),
            patch_op(json!([
                {"op": "add", "path": "groups", "value": [{"value": new}]},
                {"op": "remove", "path": format!("groups[value eq \"{}\"]", old)}
            ])),
        ),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(relation_ids(body(&response), "groups"), vec![new.clone()]);
    assert!(connector.calls_to("modifyUser").await.is_empty());
    assert_eq!(connector.calls_to("modifyGroupMembers").await.len(), 2);
}

#[tokio::test]
async fn test_patch_membership_failure_is_server_error() {
    let (gateway, connector) = create_test_gateway();
    let user_id = create(&gateway, "Users", UserBuilder::new("mover").build()).await;
    let target = create(&gateway, "Groups", group("Target", &[])).await;
    connector.fail_on("modifyGroupMembers", &target).await;

    let response = send(
        &gateway,
        GatewayRequest::patch(
            path(&format!("Users/{}", user_id)),
            patch_op(json!([{"op": "add", "path": "groups", "value": [{"value": target}]}])),
        ),
    )
    .await;

    assert_eq!(response.status, 500);
    assert!(body(&response)["detail"]
        .as_str()
        .unwrap()
        .starts_with("modifyGroupMembers error:"));
}

#[tokio::test]
async fn test_delete_user_revokes_memberships_first() {
    let (gateway, connector) = create_test_gateway();
    let user_id = create(&gateway, "Users", UserBuilder::new("leaver").build()).await;
    let group_id = create(&gateway, "Groups", group("Team", &[&user_id])).await;
    connector.clear_calls().await;

    let response = send(
        &gateway,
        GatewayRequest::delete(path(&format!("Users/{}", user_id))),
    )
    .await;

    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
    let calls = connector.calls().await;
    let revoke = calls
        .iter()
        .position(|c| c.starts_with("modifyGroupMembers:"))
        .unwrap();
    let delete = calls.iter().position(|c| c.starts_with("deleteUser:")).unwrap();
    assert!(revoke < delete);

    let group = connector.stored(TENANT, ResourceKind::Group, &group_id).await.unwrap();
    assert!(group.relations.get("members").is_none_or(|m| m.is_empty()));
    assert_eq!(get(&gateway, "Users", &user_id).await.status, 404);
}

#[tokio::test]
async fn test_delete_missing_user_is_not_found() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(&gateway, GatewayRequest::delete(path("Users/ghost"))).await;

    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_get_with_attribute_projection() {
    let (gateway, _connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::rocky().build()).await;

    let response = send(
        &gateway,
        GatewayRequest::get(path(&format!("Users/{}", id))).with_query("attributes=userName,name.givenName"),
    )
    .await;

    assert_eq!(response.status, 200);
    let user = body(&response);
    assert_eq!(user["userName"], "rocky");
    assert_eq!(user["name"]["givenName"], "Rocky");
    assert!(user["name"].get("familyName").is_none());
    assert!(user.get("emails").is_none());
    assert_eq!(user["id"], id);
}
