//! SCIM provisioning gateway for Rust.
//!
//! Exposes the SCIM 1.1 and 2.0 wire protocols to identity-management clients and
//! translates every request into calls against a pluggable backend [`Connector`] that
//! knows nothing about the protocol.
//!
//! # Core Components
//!
//! - [`ScimGateway`] - Routes, authorizes and orchestrates requests
//! - [`Connector`] - Trait implemented by backends
//! - [`AuthChain`] - Concurrent evaluation of the configured credential strategies
//! - [`codec`] - Wire objects and patch operations to and from [`CanonicalResource`]
//! - [`filter`] - Query filter parsing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scim_gateway::{GatewayConfig, GatewayRequest, InMemoryConnector, ScimGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_json_str(r#"{"baseUrl": "https://gw.example.com"}"#)?;
//! let gateway = ScimGateway::new(config, InMemoryConnector::new())?;
//! let response = gateway
//!     .handle(GatewayRequest::get("/t1/Users").with_query("filter=userName%20eq%20%22bjensen%22"))
//!     .await;
//! println!("{} {:?}", response.status, response.body);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod connector;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod model;
pub mod response;
pub mod router;
pub mod version;

// Re-export commonly used types for convenience
pub use auth::{AuthChain, AuthError, AuthScope, StrategyKind, TokenGrant};
pub use codec::{AttributeCatalog, EncodeOptions, decode_body, to_canonical, to_wire};
pub use config::{ConfigurationError, GatewayConfig, GroupMembership};
pub use connector::{Connector, ConnectorContext, ConnectorError, InMemoryConnector, ResourceList};
pub use error::{CodecError, ErrorKind, FilterError, GatewayError, GatewayResult};
pub use filter::{FilterOperator, FilterPlan, GetFilter, Predicate, SortOrder, parse_filter};
pub use gateway::{GatewayRequest, RequestBody, ScimGateway};
pub use model::{CanonicalResource, MemberRef, MultiValueEntry, ResourceKind};
pub use response::GatewayResponse;
pub use router::HttpMethod;
pub use version::ScimVersion;
