//! Authentication chain.
//!
//! Every configured strategy looks at the caller's credential concurrently and reports
//! one of three outcomes: it does not recognize the credential, it accepts it with a
//! scope, or it recognizes it but rejects it with a specific reason. The first
//! acceptance in configuration order wins; otherwise the first rejection is returned so
//! the caller learns why (expired token, wrong tenant, read-only); only when nobody
//! recognized the credential is the answer a plain "unauthenticated".
//!
//! Long-lived state (issued tokens and failure counters) lives in [`AuthState`], shared
//! by handle between requests. Each token check is a single critical section.

pub mod basic;
pub mod bearer;
pub mod jwt;
pub mod throttle;
pub mod token_store;

pub use basic::BasicStrategy;
pub use bearer::{PassThroughStrategy, StaticBearerStrategy};
pub use jwt::JwtStrategy;
pub use throttle::Throttle;
pub use token_store::{OAuthStrategy, TokenGrant, TokenStore};

use crate::config::{AuthConfig, ConfigurationError, CredentialScope};
use crate::error::ErrorKind;
use crate::router::HttpMethod;
use base64::{Engine as _, engine::general_purpose};
use futures::future::join_all;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Authentication and authorization failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthenticated: no credential strategy accepted the request")]
    Unauthenticated,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },
    #[error("Credential is not allowed for tenant '{tenant}'")]
    TenantNotAllowed { tenant: String },
    #[error("Credential is read-only; {method} is not allowed")]
    ReadOnly { method: String },
    #[error("Invalid client credentials")]
    InvalidClient,
    #[error("Unsupported grant type '{grant_type}'")]
    UnsupportedGrant { grant_type: String },
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::TenantNotAllowed { .. } | AuthError::ReadOnly { .. } => ErrorKind::Forbidden,
            AuthError::UnsupportedGrant { .. } => ErrorKind::InvalidRequest,
            _ => ErrorKind::Unauthenticated,
        }
    }
}

/// Parsed `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    Bearer(String),
    Other(String),
}

impl Credential {
    /// Returns `None` only for a blank header. Anything that is not well-formed Basic
    /// or Bearer is kept whole as [`Credential::Other`] so pass-through can still
    /// forward it.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        if header.is_empty() {
            return None;
        }
        let parsed = header
            .split_once(char::is_whitespace)
            .map(|(scheme, rest)| (scheme, rest.trim()))
            .filter(|(_, rest)| !rest.is_empty())
            .and_then(|(scheme, rest)| {
                if scheme.eq_ignore_ascii_case("basic") {
                    Self::parse_basic(rest)
                } else if scheme.eq_ignore_ascii_case("bearer") {
                    Some(Credential::Bearer(rest.to_string()))
                } else {
                    None
                }
            });
        Some(parsed.unwrap_or_else(|| Credential::Other(header.to_string())))
    }

    fn parse_basic(encoded: &str) -> Option<Self> {
        let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Credential::Bearer(token) => Some(token),
            _ => None,
        }
    }
}

/// SHA-256 fingerprint used to refer to secrets in logs and tables.
pub fn fingerprint(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Strategy that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Anonymous,
    Basic,
    BearerToken,
    BearerJwt,
    BearerJwtIssuer,
    BearerOAuth,
    PassThrough,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Anonymous => "anonymous",
            StrategyKind::Basic => "basic",
            StrategyKind::BearerToken => "bearerToken",
            StrategyKind::BearerJwt => "bearerJwt",
            StrategyKind::BearerJwtIssuer => "bearerJwtIssuer",
            StrategyKind::BearerOAuth => "bearerOAuth",
            StrategyKind::PassThrough => "passThrough",
        }
    }
}

/// What an authenticated caller may do.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthScope {
    pub strategy: StrategyKind,
    pub principal: String,
    pub read_only: bool,
    /// Allowed tenants; empty means all
    pub tenants: Vec<String>,
    /// Raw `Authorization` value forwarded to the connector
    pub passthrough: Option<String>,
}

impl AuthScope {
    pub fn new(strategy: StrategyKind, principal: impl Into<String>, scope: &CredentialScope) -> Self {
        Self {
            strategy,
            principal: principal.into(),
            read_only: scope.read_only,
            tenants: scope.tenants.clone(),
            passthrough: None,
        }
    }

    /// Unrestricted scope used when no strategy is configured.
    pub fn anonymous() -> Self {
        Self::new(StrategyKind::Anonymous, "anonymous", &CredentialScope::default())
    }

    /// Check tenant allow-list and read-only restriction.
    pub fn permits(&self, method: HttpMethod, tenant: &str) -> Result<(), AuthError> {
        if !self.tenants.is_empty() && !self.tenants.iter().any(|t| t.eq_ignore_ascii_case(tenant))
        {
            return Err(AuthError::TenantNotAllowed {
                tenant: tenant.to_string(),
            });
        }
        if self.read_only && method != HttpMethod::Get {
            return Err(AuthError::ReadOnly {
                method: method.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Turn a recognized credential into an outcome, applying scope restrictions.
    pub fn into_outcome(self, method: HttpMethod, tenant: &str) -> StrategyOutcome {
        match self.permits(method, tenant) {
            Ok(()) => StrategyOutcome::Accepted(self),
            Err(e) => StrategyOutcome::Rejected(e),
        }
    }
}

/// Result of one strategy looking at one credential.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    NotRecognized,
    Accepted(AuthScope),
    Rejected(AuthError),
}

/// Request facts the chain decides on.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub authorization: Option<&'a str>,
    pub method: HttpMethod,
    pub tenant: &'a str,
    pub remote_addr: Option<&'a str>,
}

/// State shared by every request: issued tokens and failure counters.
#[derive(Debug)]
pub struct AuthState {
    pub tokens: TokenStore,
    pub throttle: Throttle,
}

impl AuthState {
    pub fn new(throttle: Throttle) -> Self {
        Self {
            tokens: TokenStore::new(),
            throttle,
        }
    }
}

/// One configured strategy.
#[derive(Debug)]
pub enum Strategy {
    Basic(BasicStrategy),
    StaticBearer(StaticBearerStrategy),
    Jwt(JwtStrategy),
    OAuth(OAuthStrategy),
    PassThrough(PassThroughStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Basic(_) => StrategyKind::Basic,
            Strategy::StaticBearer(_) => StrategyKind::BearerToken,
            Strategy::Jwt(jwt) => jwt.kind(),
            Strategy::OAuth(_) => StrategyKind::BearerOAuth,
            Strategy::PassThrough(_) => StrategyKind::PassThrough,
        }
    }

    async fn evaluate(
        &self,
        credential: &Credential,
        request: &AuthRequest<'_>,
        state: &AuthState,
    ) -> StrategyOutcome {
        match self {
            Strategy::Basic(s) => s.evaluate(credential, request),
            Strategy::StaticBearer(s) => s.evaluate(credential, request),
            Strategy::Jwt(s) => s.evaluate(credential, request),
            Strategy::OAuth(s) => s.evaluate(credential, request, &state.tokens).await,
            Strategy::PassThrough(s) => s.evaluate(credential, request),
        }
    }
}

/// Ordered set of strategies plus the shared state they consult.
#[derive(Debug, Clone)]
pub struct AuthChain {
    strategies: Arc<Vec<Strategy>>,
    oauth: Option<Arc<OAuthStrategy>>,
    state: Arc<AuthState>,
}

impl AuthChain {
    /// Build the chain from configuration. Strategy order follows the configuration
    /// sections: basic, bearerToken, bearerJwt, bearerJwtIssuer, bearerOAuth, passThrough.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigurationError> {
        let mut strategies = Vec::new();
        if !config.basic.is_empty() {
            strategies.push(Strategy::Basic(BasicStrategy::new(config.basic.clone())));
        }
        if !config.bearer_token.is_empty() {
            strategies.push(Strategy::StaticBearer(StaticBearerStrategy::new(
                config.bearer_token.clone(),
            )));
        }
        if !config.bearer_jwt.is_empty() {
            strategies.push(Strategy::Jwt(JwtStrategy::generic(&config.bearer_jwt)?));
        }
        if !config.bearer_jwt_issuer.is_empty() {
            strategies.push(Strategy::Jwt(JwtStrategy::named_issuer(
                &config.bearer_jwt_issuer,
            )?));
        }
        let oauth = if config.bearer_oauth.is_empty() {
            None
        } else {
            let oauth = OAuthStrategy::new(config.bearer_oauth.clone());
            strategies.push(Strategy::OAuth(oauth.clone()));
            Some(Arc::new(oauth))
        };
        if config.pass_through.enabled {
            strategies.push(Strategy::PassThrough(PassThroughStrategy::new(
                config.pass_through.scope.clone(),
            )));
        }

        if strategies.is_empty() {
            warn!("No authentication strategy configured; all requests are accepted");
        }
        Ok(Self {
            strategies: Arc::new(strategies),
            oauth,
            state: Arc::new(AuthState::new(Throttle::from_config(&config.throttle))),
        })
    }

    pub fn state(&self) -> &Arc<AuthState> {
        &self.state
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(Strategy::kind).collect()
    }

    fn caller_key(request: &AuthRequest<'_>) -> String {
        match (request.remote_addr, request.authorization) {
            (Some(addr), _) => addr.to_string(),
            (None, Some(authorization)) => fingerprint(authorization),
            (None, None) => "anonymous".to_string(),
        }
    }

    /// Decide whether the request may proceed and with which scope.
    pub async fn authorize(&self, request: &AuthRequest<'_>) -> Result<AuthScope, AuthError> {
        if self.strategies.is_empty() {
            return Ok(AuthScope::anonymous());
        }

        let caller = Self::caller_key(request);
        self.state.throttle.delay_if_throttled(&caller).await;

        let result = match request.authorization.and_then(Credential::parse) {
            None => Err(AuthError::Unauthenticated),
            Some(credential) => {
                let outcomes = join_all(
                    self.strategies
                        .iter()
                        .map(|strategy| strategy.evaluate(&credential, request, &self.state)),
                )
                .await;
                select_outcome(outcomes)
            }
        };

        match &result {
            Ok(scope) => {
                debug!(
                    "Authenticated {} via {} for tenant {}",
                    scope.principal,
                    scope.strategy.as_str(),
                    request.tenant
                );
                self.state.throttle.record_success(&caller).await;
            }
            Err(e) if e.kind() == ErrorKind::Unauthenticated => {
                self.state.throttle.record_failure(&caller).await;
            }
            Err(_) => {}
        }
        result
    }

    /// Issue a dynamic token for a `client_credentials` grant.
    pub async fn issue_token(
        &self,
        client_id: &str,
        client_secret: &str,
        tenant: &str,
        remote_addr: Option<&str>,
    ) -> Result<TokenGrant, AuthError> {
        let caller = remote_addr
            .map(String::from)
            .unwrap_or_else(|| fingerprint(client_id));
        self.state.throttle.delay_if_throttled(&caller).await;

        let Some(oauth) = &self.oauth else {
            self.state.throttle.record_failure(&caller).await;
            return Err(AuthError::InvalidClient);
        };
        let result = oauth
            .issue(client_id, client_secret, tenant, &self.state.tokens)
            .await;
        match &result {
            Ok(_) => self.state.throttle.record_success(&caller).await,
            Err(_) => self.state.throttle.record_failure(&caller).await,
        }
        result
    }
}

/// First acceptance wins, then the first rejection, then "unauthenticated".
fn select_outcome(outcomes: Vec<StrategyOutcome>) -> Result<AuthScope, AuthError> {
    let mut rejection = None;
    for outcome in outcomes {
        match outcome {
            StrategyOutcome::Accepted(scope) => return Ok(scope),
            StrategyOutcome::Rejected(e) => {
                rejection.get_or_insert(e);
            }
            StrategyOutcome::NotRecognized => {}
        }
    }
    Err(rejection.unwrap_or(AuthError::Unauthenticated))
}
