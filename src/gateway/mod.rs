//! Framework-agnostic provisioning gateway.
//!
//! Routes a transport-neutral request, authorizes it, runs the orchestration for the
//! addressed endpoint and renders the response envelope.
//!
//! # Key Types
//!
//! - [`ScimGateway`] - Main entry point, generic over the backend [`Connector`](crate::connector::Connector)
//! - [`GatewayRequest`] - Method, path, query, credential and body
//! - [`GatewayResponse`](crate::response::GatewayResponse) - Status, body and `Location`
//!
//! # Examples
//!
//! ```rust,no_run
//! use scim_gateway::{GatewayConfig, GatewayRequest, InMemoryConnector, ScimGateway};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = ScimGateway::new(GatewayConfig::default(), InMemoryConnector::new())?;
//! let request = GatewayRequest::post("/t1/Users", json!({"userName": "bjensen"}));
//! let response = gateway.handle(request).await;
//! assert_eq!(response.status, 201);
//! # Ok(())
//! # }
//! ```

mod core;
mod errors;
pub mod fanout;
pub mod handlers;

pub use self::core::{GatewayRequest, HandlerContext, RequestBody, ScimGateway};
pub use errors::create_error_response;
pub use handlers::replace::{MembershipDiff, ReplacePlan, plan_replace};
