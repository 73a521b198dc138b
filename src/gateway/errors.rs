//! Error response creation shared by all handlers.

use crate::error::{ErrorKind, GatewayError};
use crate::response::GatewayResponse;
use crate::version::ScimVersion;
use log::{debug, error, warn};

/// Render an error and log it at a level matching its kind.
///
/// Not-found is routine and only logged at debug level.
pub fn create_error_response(
    error: &GatewayError,
    version: ScimVersion,
    request_id: &str,
) -> GatewayResponse {
    let response = GatewayResponse::error(error, version, request_id);
    match error.kind() {
        ErrorKind::NotFound => {
            debug!("SCIM gateway: {} (request: '{}')", error, request_id);
        }
        kind if kind.is_client_error()
            || matches!(
                kind,
                ErrorKind::MethodNotAllowed
                    | ErrorKind::Conflict
                    | ErrorKind::Unauthenticated
                    | ErrorKind::Forbidden
            ) =>
        {
            warn!(
                "SCIM gateway rejected request with {}: {} (request: '{}')",
                response.status, error, request_id
            );
        }
        _ => {
            error!(
                "SCIM gateway failed with {}: {} (request: '{}')",
                response.status, error, request_id
            );
        }
    }
    response
}
