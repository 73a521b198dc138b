//! Attribute and patch codec.
//!
//! Inbound, two protocol generations are reduced to one canonical model:
//!
//! 1. [`patch::patch_to_legacy`] rewrites a versioned `Operations` list into the legacy
//!    attribute-object shape (arrays with `operation: delete` markers plus a
//!    `meta.attributes` removal list).
//! 2. [`canonical::to_canonical`] folds legacy-shaped objects into a
//!    [`CanonicalResource`](crate::model::CanonicalResource), keying multi-valued
//!    attributes by `type` and turning removals into blank writes.
//!
//! Outbound, [`wire::to_wire`] re-expands canonical resources into protocol objects.

pub mod canonical;
pub mod patch;
pub mod path;
pub mod wire;

pub use canonical::to_canonical;
pub use patch::{PatchOp, PatchOperation, is_versioned_patch, patch_to_legacy};
pub use path::PatchPath;
pub use wire::{EncodeOptions, to_wire};

use crate::config::GatewayConfig;
use crate::error::CodecResult;
use crate::model::CanonicalResource;
use serde_json::Value;
use std::collections::BTreeSet;

/// Attribute names the codec treats specially.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCatalog {
    type_keyed: BTreeSet<String>,
    relations: BTreeSet<String>,
    /// Namespaced extension schema URNs, longest first.
    extension_schemas: Vec<String>,
}

impl AttributeCatalog {
    pub fn new<T, R, E>(type_keyed: T, relations: R, extension_schemas: E) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let mut extension_schemas: Vec<String> =
            extension_schemas.into_iter().map(Into::into).collect();
        extension_schemas.sort_by(|a, b| b.len().cmp(&a.len()));
        Self {
            type_keyed: type_keyed.into_iter().map(Into::into).collect(),
            relations: relations.into_iter().map(Into::into).collect(),
            extension_schemas,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.type_keyed_attributes.iter().cloned(),
            config.relation_attributes.iter().cloned(),
            config.extension_schemas.iter().cloned(),
        )
    }

    pub fn is_type_keyed(&self, attribute: &str) -> bool {
        self.type_keyed.contains(attribute)
    }

    pub fn is_relation(&self, attribute: &str) -> bool {
        self.relations.contains(attribute)
    }

    pub fn is_multi_valued(&self, attribute: &str) -> bool {
        self.is_type_keyed(attribute) || self.is_relation(attribute)
    }

    pub fn extension_schemas(&self) -> &[String] {
        &self.extension_schemas
    }
}

impl Default for AttributeCatalog {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// Decode a create/modify/replace body of either protocol generation into canonical form.
pub fn decode_body(body: &Value, catalog: &AttributeCatalog) -> CodecResult<CanonicalResource> {
    if is_versioned_patch(body) {
        let legacy = patch_to_legacy(body, catalog)?;
        to_canonical(&Value::Object(legacy), catalog)
    } else {
        to_canonical(body, catalog)
    }
}
