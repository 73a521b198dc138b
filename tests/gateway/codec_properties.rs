//! Property tests for the wire codec.

use proptest::prelude::*;
use scim_gateway::{
    AttributeCatalog, EncodeOptions, GatewayConfig, ResourceKind, ScimVersion, decode_body,
    to_canonical, to_wire,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn catalog() -> AttributeCatalog {
    AttributeCatalog::from_config(&GatewayConfig::default())
}

fn user_body(user_name: &str, emails: &BTreeMap<String, String>) -> Value {
    let emails: Vec<Value> = emails
        .iter()
        .map(|(type_key, value)| json!({"type": type_key, "value": value}))
        .collect();
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "userName": user_name,
        "emails": emails,
    })
}

proptest! {
    #[test]
    fn wire_round_trip_preserves_canonical_form(
        user_name in "[a-z]{1,12}",
        emails in prop::collection::btree_map("[a-z]{1,8}", "[a-z]{1,10}@example\\.com", 1..5),
        version in prop::sample::select(vec![ScimVersion::V1, ScimVersion::V2]),
    ) {
        let catalog = catalog();
        let canonical = to_canonical(&user_body(&user_name, &emails), &catalog).unwrap();
        let wire = to_wire(&canonical, &EncodeOptions::new(version, ResourceKind::User));
        let again = to_canonical(&wire, &catalog).unwrap();
        prop_assert_eq!(canonical, again);
    }

    #[test]
    fn duplicate_type_is_always_a_collision(
        type_key in "[a-z]{1,8}",
        first in "[a-z]{1,10}",
        second in "[a-z]{1,10}",
    ) {
        let body = json!({
            "userName": "dup",
            "emails": [
                {"type": type_key, "value": first},
                {"type": type_key, "value": second},
            ]
        });
        prop_assert!(to_canonical(&body, &catalog()).is_err());
    }

    #[test]
    fn patch_replace_of_scalar_sets_exactly_that_attribute(
        attribute in "[a-z]{3,10}",
        value in "[A-Za-z0-9 ]{1,20}",
    ) {
        prop_assume!(!catalog().is_multi_valued(&attribute));
        prop_assume!(!["id", "schemas", "meta", "active"].contains(&attribute.as_str()));
        let body = json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{"op": "replace", "path": attribute, "value": value}]
        });
        let patch = decode_body(&body, &catalog()).unwrap();
        prop_assert_eq!(patch.attributes.len(), 1);
        prop_assert_eq!(patch.get_str(&attribute), Some(value.as_str()));
        prop_assert!(patch.multi_valued.is_empty());
    }
}
