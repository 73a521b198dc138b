//! Gateway configuration.
//!
//! Loaded from JSON (camelCase keys, every field optional) and validated once before the
//! gateway is built. Reading the file and wiring the process are left to the embedding
//! application.

use crate::version::{ScimVersion, V1_ENTERPRISE_SCHEMA, V2_ENTERPRISE_SCHEMA};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
    /// Serialization/deserialization error
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

/// Which side of the User↔Group relationship the connector stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMembership {
    /// Groups hold `members`; a user's `groups` are derived by querying groups.
    #[default]
    Members,
    /// Users hold `groups` directly; nothing is derived.
    Groups,
}

/// Restrictions shared by every credential entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialScope {
    /// Only GET is allowed
    pub read_only: bool,
    /// Tenants this credential may address; empty means all
    pub tenants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicCredential {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BearerTokenCredential {
    pub token: String,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

/// Key material for verifying signed bearer tokens.
///
/// Exactly one of `secret` (HMAC) or `publicKey` (RSA PEM) must be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtKey {
    pub secret: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtCredential {
    #[serde(flatten)]
    pub key: JwtKey,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

/// Signed tokens from a named identity provider, pinned by issuer and audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtIssuerCredential {
    pub issuer: String,
    pub audience: String,
    #[serde(flatten)]
    pub key: JwtKey,
    /// Accepted values of the `tid` claim; empty means any
    #[serde(default)]
    pub allowed_tenant_ids: Vec<String>,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

/// Client allowed to obtain dynamic tokens from the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClientCredential {
    pub client_id: String,
    pub client_secret: String,
    /// Token lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PassThroughConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub scope: CredentialScope,
}

/// Delay applied to callers after repeated authentication failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleConfig {
    pub failure_threshold: u32,
    pub failure_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub basic: Vec<BasicCredential>,
    pub bearer_token: Vec<BearerTokenCredential>,
    pub bearer_jwt: Vec<JwtCredential>,
    pub bearer_jwt_issuer: Vec<JwtIssuerCredential>,
    #[serde(rename = "bearerOAuth")]
    pub bearer_oauth: Vec<OAuthClientCredential>,
    pub pass_through: PassThroughConfig,
    pub throttle: ThrottleConfig,
}

impl AuthConfig {
    /// True when no strategy is configured at all.
    pub fn is_empty(&self) -> bool {
        self.basic.is_empty()
            && self.bearer_token.is_empty()
            && self.bearer_jwt.is_empty()
            && self.bearer_jwt_issuer.is_empty()
            && self.bearer_oauth.is_empty()
            && !self.pass_through.enabled
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Public base URL used for `meta.location`, e.g. `https://gw.example.com`
    pub base_url: String,
    pub scim_version: ScimVersion,
    pub include_location: bool,
    pub group_membership: GroupMembership,
    /// PUT only adds, never clears or revokes
    pub soft_sync: bool,
    pub type_keyed_attributes: Vec<String>,
    pub relation_attributes: Vec<String>,
    pub extension_schemas: Vec<String>,
    pub user_endpoints: Vec<String>,
    pub group_endpoints: Vec<String>,
    pub or_filter_batch_size: usize,
    pub default_count: usize,
    pub auth: AuthConfig,
}

fn default_expires_in() -> u64 {
    3600
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            scim_version: ScimVersion::V2,
            include_location: true,
            group_membership: GroupMembership::Members,
            soft_sync: false,
            type_keyed_attributes: strings(&[
                "emails",
                "phoneNumbers",
                "addresses",
                "entitlements",
                "ims",
                "photos",
                "roles",
                "x509Certificates",
            ]),
            relation_attributes: strings(&["members", "groups"]),
            extension_schemas: strings(&[V2_ENTERPRISE_SCHEMA, V1_ENTERPRISE_SCHEMA]),
            user_endpoints: strings(&["Users"]),
            group_endpoints: strings(&["Groups"]),
            or_filter_batch_size: 5,
            default_count: crate::filter::DEFAULT_COUNT,
            auth: AuthConfig::default(),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::ValidationError {
        message: message.into(),
    }
}

fn validate_key(kind: &str, key: &JwtKey) -> Result<(), ConfigurationError> {
    match (&key.secret, &key.public_key) {
        (Some(_), Some(_)) => Err(invalid(format!(
            "{} entries take either 'secret' or 'publicKey', not both",
            kind
        ))),
        (None, None) => Err(invalid(format!(
            "{} entries need a 'secret' or a 'publicKey'",
            kind
        ))),
        _ => Ok(()),
    }
}

impl GatewayConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: GatewayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.or_filter_batch_size == 0 {
            return Err(invalid("orFilterBatchSize must be greater than 0"));
        }
        if self.default_count == 0 {
            return Err(invalid("defaultCount must be greater than 0"));
        }
        if self.user_endpoints.is_empty() || self.group_endpoints.is_empty() {
            return Err(invalid("userEndpoints and groupEndpoints must not be empty"));
        }

        let mut seen = BTreeSet::new();
        for alias in self.user_endpoints.iter().chain(&self.group_endpoints) {
            if !seen.insert(alias.to_ascii_lowercase()) {
                return Err(invalid(format!("endpoint alias '{}' is used twice", alias)));
            }
        }

        if let Some(attribute) = self
            .type_keyed_attributes
            .iter()
            .find(|a| self.relation_attributes.contains(a))
        {
            return Err(invalid(format!(
                "'{}' cannot be both type-keyed and a relation",
                attribute
            )));
        }
        if !self.relation_attributes.iter().any(|a| a == "members")
            || !self.relation_attributes.iter().any(|a| a == "groups")
        {
            return Err(invalid("relationAttributes must include 'members' and 'groups'"));
        }

        for basic in &self.auth.basic {
            if basic.username.is_empty() || basic.password.is_empty() {
                return Err(invalid("basic entries need a username and a password"));
            }
        }
        if self.auth.bearer_token.iter().any(|b| b.token.is_empty()) {
            return Err(invalid("bearerToken entries need a token"));
        }
        for jwt in &self.auth.bearer_jwt {
            validate_key("bearerJwt", &jwt.key)?;
        }
        for jwt in &self.auth.bearer_jwt_issuer {
            validate_key("bearerJwtIssuer", &jwt.key)?;
            if jwt.issuer.is_empty() || jwt.audience.is_empty() {
                return Err(invalid("bearerJwtIssuer entries need an issuer and an audience"));
            }
        }
        for client in &self.auth.bearer_oauth {
            if client.client_id.is_empty() || client.client_secret.is_empty() {
                return Err(invalid("bearerOAuth entries need a clientId and a clientSecret"));
            }
            if client.expires_in == 0 {
                return Err(invalid("bearerOAuth expiresIn must be greater than 0"));
            }
        }
        Ok(())
    }
}
