//! Protocol versions and the schema URIs each one emits.

use crate::model::ResourceKind;
use serde::{Deserialize, Serialize};

pub const V1_CORE_SCHEMA: &str = "urn:scim:schemas:core:1.0";
pub const V1_ENTERPRISE_SCHEMA: &str = "urn:scim:schemas:extension:enterprise:1.0";

pub const V2_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const V2_GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const V2_ENTERPRISE_SCHEMA: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";
pub const V2_LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
pub const V2_ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";
pub const V2_PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";
pub const V2_SERVICE_PROVIDER_CONFIG_SCHEMA: &str =
    "urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig";
pub const V2_RESOURCE_TYPE_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:ResourceType";

/// SCIM protocol generation spoken on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScimVersion {
    /// Legacy attribute-object semantics
    #[serde(rename = "1.1", alias = "1.0", alias = "1")]
    V1,
    /// Structured patch-operation semantics
    #[default]
    #[serde(rename = "2.0", alias = "2")]
    V2,
}

impl ScimVersion {
    /// Recognize a version marker path segment such as `v2` or `scim1.1`.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "v1" | "v1.1" | "scim1" | "scim1.1" => Some(ScimVersion::V1),
            "v2" | "v2.0" | "scim2" | "scim2.0" => Some(ScimVersion::V2),
            _ => None,
        }
    }

    /// Core schema URI for a resource kind.
    pub fn core_schema(self, kind: ResourceKind) -> &'static str {
        match (self, kind) {
            (ScimVersion::V1, _) => V1_CORE_SCHEMA,
            (ScimVersion::V2, ResourceKind::User) => V2_USER_SCHEMA,
            (ScimVersion::V2, ResourceKind::Group) => V2_GROUP_SCHEMA,
        }
    }

    /// Schema URI of the list envelope.
    pub fn list_schema(self) -> &'static str {
        match self {
            ScimVersion::V1 => V1_CORE_SCHEMA,
            ScimVersion::V2 => V2_LIST_RESPONSE_SCHEMA,
        }
    }

    /// Core schema prefixes that may qualify attribute paths in patch requests.
    pub fn core_schema_prefixes() -> [&'static str; 3] {
        [V2_USER_SCHEMA, V2_GROUP_SCHEMA, V1_CORE_SCHEMA]
    }

    /// Enterprise extension URI.
    pub fn enterprise_schema(self) -> &'static str {
        match self {
            ScimVersion::V1 => V1_ENTERPRISE_SCHEMA,
            ScimVersion::V2 => V2_ENTERPRISE_SCHEMA,
        }
    }
}
