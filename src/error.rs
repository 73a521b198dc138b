//! Error types for gateway operations.
//!
//! Every failure crossing the orchestrator is a [`GatewayError`]. The error knows its own
//! [`ErrorKind`], the HTTP status it maps to for a given protocol version, and the SCIM
//! `scimType` keyword used in version 2 error envelopes.

use crate::auth::AuthError;
use crate::connector::ConnectorError;
use crate::version::ScimVersion;

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed body, missing mandatory attribute, bad parameter
    InvalidRequest,
    /// Filter expression rejected
    InvalidFilter,
    /// Patch path could not be resolved
    InvalidPath,
    /// Two multi-value entries collide on the same type key
    Uniqueness,
    /// Resource or route does not exist
    NotFound,
    /// HTTP method not supported on the matched route
    MethodNotAllowed,
    /// Connector reported a duplicate
    Conflict,
    /// No credential strategy recognized the caller, or the token was invalid/expired
    Unauthenticated,
    /// Credential recognized but not allowed for this tenant or method
    Forbidden,
    /// Some sub-operations of a fan-out failed
    PartialFailure,
    /// Opaque connector failure
    Connector,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Client errors are reported as 400 by version 2 and as 500 by version 1.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest
                | ErrorKind::InvalidFilter
                | ErrorKind::InvalidPath
                | ErrorKind::Uniqueness
        )
    }
}

/// Main error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Attribute or patch conversion failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Query filter rejected
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Authentication or authorization failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Invalid request format or parameters
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Resource or route not found
    #[error("{message}")]
    NotFound { message: String },

    /// Method not supported on route
    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    /// Connector reported that the resource already exists
    #[error("{action} conflict: {message}")]
    Conflict { action: String, message: String },

    /// Connector failure wrapped with the action that triggered it
    #[error("{action} error: {message}")]
    Connector { action: String, message: String },

    /// Aggregate of failed sub-operations, one line per failure
    #[error("{action} error: {}", failures.join("\n"))]
    PartialFailure {
        action: String,
        failures: Vec<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while converting wire objects and patch operations.
///
/// Each variant names the offending attribute path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Two non-deleted elements share a type key
    #[error("Attribute '{attribute}' has more than one entry of type '{type_key}'")]
    TypeKeyCollision { attribute: String, type_key: String },

    /// Two address elements of the same type set the same field differently
    #[error("Attribute 'addresses' of type '{type_key}' sets '{field}' more than once")]
    AddressFieldCollision { type_key: String, field: String },

    /// Patch path cannot be resolved
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Attribute value has the wrong shape
    #[error("Attribute '{attribute}' has invalid value: {details}")]
    InvalidValue { attribute: String, details: String },

    /// Mandatory attribute missing
    #[error("Required attribute '{attribute}' is missing")]
    MissingAttribute { attribute: String },

    /// Patch `op` not one of add/replace/remove
    #[error("Unsupported patch operation '{op}'")]
    UnsupportedOperation { op: String },

    /// Body is not usable at all
    #[error("Invalid body: {details}")]
    InvalidBody { details: String },
}

/// Errors raised while parsing query filters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// Filtering on a secret attribute is never allowed
    #[error("Filtering on '{attribute}' is not allowed")]
    SecretAttribute { attribute: String },

    /// Filter does not follow the grammar
    #[error("Malformed filter '{filter}': {details}")]
    Malformed { filter: String, details: String },

    /// Unknown comparison operator
    #[error("Unsupported filter operator '{operator}'")]
    UnsupportedOperator { operator: String },
}

impl GatewayError {
    /// Create a not found error for a resource.
    pub fn resource_not_found(resource_type: impl AsRef<str>, id: impl AsRef<str>) -> Self {
        Self::NotFound {
            message: format!("{} {} not found", resource_type.as_ref(), id.as_ref()),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap a connector error with the action name that produced it.
    pub fn connector(action: impl Into<String>, error: ConnectorError) -> Self {
        let action = action.into();
        match error {
            ConnectorError::Conflict(message) => Self::Conflict { action, message },
            ConnectorError::NotFound(message) => Self::NotFound {
                message: format!("{} error: {}", action, message),
            },
            ConnectorError::Failed(message) => Self::Connector { action, message },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Codec(e) => match e {
                CodecError::TypeKeyCollision { .. } | CodecError::AddressFieldCollision { .. } => {
                    ErrorKind::Uniqueness
                }
                CodecError::InvalidPath { .. } => ErrorKind::InvalidPath,
                _ => ErrorKind::InvalidRequest,
            },
            GatewayError::Filter(_) => ErrorKind::InvalidFilter,
            GatewayError::Auth(e) => e.kind(),
            GatewayError::InvalidRequest { .. } | GatewayError::Json(_) => {
                ErrorKind::InvalidRequest
            }
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            GatewayError::Conflict { .. } => ErrorKind::Conflict,
            GatewayError::Connector { .. } => ErrorKind::Connector,
            GatewayError::PartialFailure { .. } => ErrorKind::PartialFailure,
            GatewayError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error under the given protocol version.
    pub fn status(&self, version: ScimVersion) -> u16 {
        match self.kind() {
            kind if kind.is_client_error() => match version {
                ScimVersion::V1 => 500,
                ScimVersion::V2 => 400,
            },
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Conflict => 409,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            _ => 500,
        }
    }

    /// SCIM 2.0 `scimType` keyword, where one applies.
    pub fn scim_type(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Uniqueness | ErrorKind::Conflict => Some("uniqueness"),
            ErrorKind::InvalidFilter => Some("invalidFilter"),
            ErrorKind::InvalidPath => Some("invalidPath"),
            ErrorKind::InvalidRequest => match self {
                GatewayError::Json(_) | GatewayError::Codec(CodecError::InvalidBody { .. }) => {
                    Some("invalidSyntax")
                }
                _ => Some("invalidValue"),
            },
            _ => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
pub type CodecResult<T> = Result<T, CodecError>;
