//! Filtered lists, OR unions and pagination metadata.

use crate::common::builders::{UserBuilder, group};
use crate::common::{
    TENANT, body, create, create_gateway_with, create_test_gateway, path, relation_ids, send,
    test_config,
};
use scim_gateway::{
    CanonicalResource, GatewayRequest, InMemoryConnector, MemberRef, ResourceKind, SortOrder,
};
use serde_json::json;

fn list(query: &str) -> GatewayRequest {
    GatewayRequest::get(path("Users")).with_query(query)
}

fn user_names(response: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = response["Resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["userName"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

/// `userName` values in response order.
fn ordered_names(response: &serde_json::Value) -> Vec<&str> {
    response["Resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["userName"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_equality_filter() {
    let (gateway, connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::new("bjensen").build()).await;
    create(&gateway, "Users", UserBuilder::new("jsmith").build()).await;

    let response = send(&gateway, list("filter=userName%20eq%20%22BJENSEN%22")).await;

    assert_eq!(response.status, 200);
    let page = body(&response);
    assert_eq!(page["schemas"][0], "urn:ietf:params:scim:api:messages:2.0:ListResponse");
    assert_eq!(page["totalResults"], 1);
    assert_eq!(page["startIndex"], 1);
    assert_eq!(user_names(page), vec!["bjensen"]);
    assert_eq!(connector.calls_to("getUsers").await, vec!["getUsers:BJENSEN"]);
}

#[tokio::test]
async fn test_filter_on_multi_valued_sub_attribute() {
    let (gateway, _connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::rocky().build()).await;
    create(&gateway, "Users", UserBuilder::new("other").build()).await;

    let response = send(
        &gateway,
        list("filter=emails.value%20eq%20%22rocky%40home.example.com%22"),
    )
    .await;

    assert_eq!(response.status, 200);
    assert_eq!(user_names(body(&response)), vec!["rocky"]);
}

#[tokio::test]
async fn test_or_filter_unions_lookups() {
    let (gateway, connector) = create_test_gateway();
    for name in ["alice", "bob", "carol"] {
        create(&gateway, "Users", UserBuilder::new(name).build()).await;
    }
    connector.clear_calls().await;

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22alice%22%20or%20userName%20eq%20%22carol%22%20or%20userName%20eq%20%22alice%22"),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let page = body(&response);
    assert_eq!(user_names(page), vec!["alice", "carol"]);
    assert_eq!(page["totalResults"], 2);
    assert_eq!(connector.calls_to("getUsers").await.len(), 3);
}

#[tokio::test]
async fn test_or_filter_failure_aggregates_every_clause() {
    let (gateway, connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::new("x").build()).await;
    connector.fail_on("getUsers", "y").await;
    connector.fail_on("getUsers", "z").await;

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22x%22%20or%20userName%20eq%20%22y%22%20or%20userName%20eq%20%22z%22"),
    )
    .await;

    assert_eq!(response.status, 500);
    let detail = body(&response)["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("getUsers error:"));
    assert!(detail.contains("userName eq \"y\""));
    assert!(detail.contains("userName eq \"z\""));
    assert!(!detail.contains("userName eq \"x\""));
}

#[tokio::test]
async fn test_compound_filter_is_left_to_the_connector() {
    let (gateway, _connector) = create_test_gateway();

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22a%22%20and%20active%20eq%20true"),
    )
    .await;

    // The in-memory connector refuses raw compound filters.
    assert_eq!(response.status, 500);
    assert!(body(&response)["detail"]
        .as_str()
        .unwrap()
        .starts_with("getUsers error:"));
}

#[tokio::test]
async fn test_filter_on_password_is_rejected() {
    let (gateway, connector) = create_test_gateway();

    let response = send(&gateway, list("filter=password%20eq%20%22x%22")).await;

    assert_eq!(response.status, 400);
    assert_eq!(body(&response)["scimType"], "invalidFilter");
    assert!(connector.calls().await.is_empty());
}

#[tokio::test]
async fn test_pagination_uses_connector_total() {
    let (gateway, _connector) = create_test_gateway();
    for name in ["u1", "u2", "u3", "u4", "u5"] {
        create(&gateway, "Users", UserBuilder::new(name).build()).await;
    }

    let response = send(&gateway, list("startIndex=2&count=2")).await;

    assert_eq!(response.status, 200);
    let page = body(&response);
    assert_eq!(page["totalResults"], 5);
    assert_eq!(page["itemsPerPage"], 2);
    assert_eq!(page["startIndex"], 2);
}

#[tokio::test]
async fn test_pagination_without_connector_total() {
    let (gateway, _connector) = create_gateway_with(
        test_config(),
        InMemoryConnector::new().without_total_results(),
    );
    for name in ["u1", "u2", "u3"] {
        create(&gateway, "Users", UserBuilder::new(name).build()).await;
    }

    let response = send(&gateway, list("count=2")).await;

    let page = body(&response);
    assert_eq!(page["totalResults"], 2);
    assert_eq!(page["itemsPerPage"], 2);
}

#[tokio::test]
async fn test_list_enriches_every_user_with_groups() {
    let (gateway, connector) = create_test_gateway();
    let a = create(&gateway, "Users", UserBuilder::new("a").build()).await;
    let b = create(&gateway, "Users", UserBuilder::new("b").build()).await;
    let team = create(&gateway, "Groups", group("Team", &[&a, &b])).await;

    let response = send(&gateway, list("")).await;
    assert_eq!(response.status, 200);
    for user in body(&response)["Resources"].as_array().unwrap() {
        assert_eq!(relation_ids(user, "groups"), vec![team.clone()]);
    }

    connector.fail_on("getGroups", &b).await;
    let failed = send(&gateway, list("")).await;
    assert_eq!(failed.status, 500);
    assert!(body(&failed)["detail"]
        .as_str()
        .unwrap()
        .starts_with("getGroups error:"));
}

#[tokio::test]
async fn test_excluding_groups_skips_enrichment() {
    let (gateway, connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::new("a").build()).await;
    connector.clear_calls().await;

    let response = send(&gateway, list("excludedAttributes=groups")).await;

    assert_eq!(response.status, 200);
    assert!(connector.calls_to("getGroups").await.is_empty());
}

#[tokio::test]
async fn test_bracket_inside_quoted_value_is_a_plain_comparison() {
    let (gateway, connector) = create_test_gateway();
    create(&gateway, "Groups", group("x[1]", &[])).await;
    create(&gateway, "Groups", group("Team [EU]", &[])).await;
    connector.clear_calls().await;

    let response = send(
        &gateway,
        GatewayRequest::get(path("Groups")).with_query("filter=displayName%20eq%20%22x%5B1%5D%22"),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let page = body(&response);
    assert_eq!(page["totalResults"], 1);
    assert_eq!(page["Resources"][0]["displayName"], "x[1]");
    assert_eq!(connector.calls_to("getGroups").await, vec!["getGroups:x[1]"]);
}

#[tokio::test]
async fn test_value_path_with_bracket_in_quoted_value() {
    let (gateway, connector) = create_test_gateway();
    let stored = connector
        .seed(
            TENANT,
            ResourceKind::Group,
            CanonicalResource::new()
                .with_attribute("displayName", json!("Odd"))
                .with_relation("members", vec![MemberRef::new("a]b")]),
        )
        .await;
    create(&gateway, "Groups", group("Other", &[])).await;

    let response = send(
        &gateway,
        GatewayRequest::get(path("Groups"))
            .with_query("filter=members%5Bvalue%20eq%20%22a%5Db%22%5D"),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let page = body(&response);
    assert_eq!(page["totalResults"], 1);
    assert_eq!(page["Resources"][0]["id"], stored);
}

#[tokio::test]
async fn test_sort_is_applied_before_pagination() {
    let (gateway, connector) = create_test_gateway();
    for name in ["carol", "Alice", "bob", "dave"] {
        create(&gateway, "Users", UserBuilder::new(name).build()).await;
    }
    connector.clear_calls().await;

    let ascending = send(&gateway, list("sortBy=userName&count=2")).await;
    assert_eq!(ordered_names(body(&ascending)), vec!["Alice", "bob"]);

    let descending = send(
        &gateway,
        list("sortBy=userName&sortOrder=DESCENDING&startIndex=2&count=2"),
    )
    .await;
    assert_eq!(ordered_names(body(&descending)), vec!["carol", "bob"]);

    let queries = connector.queries_to("getUsers").await;
    assert_eq!(queries[0].filter.sort_by.as_deref(), Some("userName"));
    assert_eq!(queries[0].filter.sort_order, SortOrder::Ascending);
    assert_eq!(queries[1].filter.sort_order, SortOrder::Descending);
}

#[tokio::test]
async fn test_or_union_is_sorted_locally() {
    let (gateway, _connector) = create_test_gateway();
    for name in ["alice", "bob", "carol"] {
        create(&gateway, "Users", UserBuilder::new(name).build()).await;
    }

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22alice%22%20or%20userName%20eq%20%22carol%22&sortBy=userName&sortOrder=descending"),
    )
    .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    assert_eq!(ordered_names(body(&response)), vec!["carol", "alice"]);
}

#[tokio::test]
async fn test_attribute_selection_reaches_the_connector() {
    let (gateway, connector) = create_test_gateway();
    let id = create(&gateway, "Users", UserBuilder::rocky().build()).await;
    connector.clear_calls().await;

    let listed = send(
        &gateway,
        list("attributes=userName,emails&excludedAttributes=emails,title"),
    )
    .await;
    assert_eq!(listed.status, 200);
    assert!(body(&listed)["Resources"][0].get("emails").is_none());

    let fetched = send(
        &gateway,
        GatewayRequest::get(path(&format!("Users/{}", id))).with_query("excludedAttributes=emails"),
    )
    .await;
    assert_eq!(fetched.status, 200);
    assert!(body(&fetched).get("emails").is_none());

    let queries = connector.queries_to("getUsers").await;
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].attributes, vec!["userName", "emails"]);
    assert_eq!(queries[0].filter.excluded_attributes, vec!["emails", "title"]);
    assert!(queries[1].attributes.is_empty());
    assert_eq!(queries[1].filter.excluded_attributes, vec!["emails"]);
    assert_eq!(queries[1].filter.value(), Some(id.as_str()));
}

#[tokio::test]
async fn test_or_union_forwards_exclusions_to_every_clause() {
    let (gateway, connector) = create_test_gateway();
    create(&gateway, "Users", UserBuilder::new("alice").build()).await;
    connector.clear_calls().await;

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22alice%22%20or%20userName%20eq%20%22bob%22&excludedAttributes=groups"),
    )
    .await;

    assert_eq!(response.status, 200);
    let queries = connector.queries_to("getUsers").await;
    assert_eq!(queries.len(), 2);
    assert!(queries
        .iter()
        .all(|q| q.filter.excluded_attributes == vec!["groups".to_string()]));
}

#[tokio::test]
async fn test_or_failure_label_escapes_quotes() {
    let (gateway, connector) = create_test_gateway();
    connector.fail_on("getUsers", "a\"b").await;

    let response = send(
        &gateway,
        list("filter=userName%20eq%20%22a%5C%22b%22%20or%20userName%20eq%20%22c%22"),
    )
    .await;

    assert_eq!(response.status, 500);
    let detail = body(&response)["detail"].as_str().unwrap().to_string();
    assert!(detail.contains(r#"userName eq "a\"b""#), "{}", detail);
    assert!(!detail.contains(r#"userName eq "c""#));
}
