//! Fluent builders for wire-format request bodies.

use serde_json::{Map, Value, json};

/// Builder for User bodies, starting from a minimal valid user.
#[derive(Debug, Clone)]
pub struct UserBuilder {
    data: Map<String, Value>,
}

impl UserBuilder {
    pub fn new(user_name: &str) -> Self {
        let mut data = Map::new();
        data.insert(
            "schemas".to_string(),
            json!(["urn:ietf:params:scim:schemas:core:2.0:User"]),
        );
        data.insert("userName".to_string(), json!(user_name));
        Self { data }
    }

    /// The Rocky Balboa user used across the suite.
    pub fn rocky() -> Self {
        Self::new("rocky")
            .with("active", json!(true))
            .with("title", json!("Boxer"))
            .with("name", json!({"givenName": "Rocky", "familyName": "Balboa"}))
            .with_email("work", "rocky@work.example.com")
            .with_email("home", "rocky@home.example.com")
    }

    pub fn with(mut self, attribute: &str, value: Value) -> Self {
        self.data.insert(attribute.to_string(), value);
        self
    }

    pub fn without(mut self, attribute: &str) -> Self {
        self.data.remove(attribute);
        self
    }

    pub fn with_email(self, type_key: &str, value: &str) -> Self {
        self.push("emails", json!({"type": type_key, "value": value}))
    }

    pub fn with_group(self, group_id: &str) -> Self {
        self.push("groups", json!({"value": group_id}))
    }

    fn push(mut self, attribute: &str, item: Value) -> Self {
        let entry = self
            .data
            .entry(attribute.to_string())
            .or_insert_with(|| json!([]));
        if let Value::Array(items) = entry {
            items.push(item);
        }
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.data)
    }
}

/// Group body with optional members.
pub fn group(display_name: &str, members: &[&str]) -> Value {
    let members: Vec<Value> = members.iter().map(|id| json!({"value": id})).collect();
    let mut body = json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
        "displayName": display_name,
    });
    if !members.is_empty() {
        body["members"] = Value::Array(members);
    }
    body
}

/// Version 2 PatchOp body.
pub fn patch_op(operations: Value) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": operations,
    })
}
