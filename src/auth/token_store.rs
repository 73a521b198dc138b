//! Dynamically issued bearer tokens.
//!
//! Tokens are random, opaque and stored only as SHA-256 fingerprints. A lookup reads,
//! checks expiry and evicts inside one lock acquisition, so two concurrent requests can
//! never both accept (or both evict) a token that is about to expire.

use super::{AuthError, AuthRequest, AuthScope, Credential, StrategyKind, StrategyOutcome, fingerprint};
use crate::config::{CredentialScope, OAuthClientCredential};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

/// Upper bound on a token lifetime (one year).
const MAX_LIFETIME_SECS: u64 = 31_536_000;

/// Response body of the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
struct StoredToken {
    client_id: String,
    scope: CredentialScope,
    expires_at: DateTime<Utc>,
}

/// Outcome of looking up a presented token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenLookup {
    Unknown,
    Expired,
    Valid { client_id: String, scope: CredentialScope },
}

#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        token: &str,
        client_id: &str,
        scope: CredentialScope,
        expires_at: DateTime<Utc>,
    ) {
        let mut tokens = self.tokens.lock().await;
        // Opportunistic cleanup keeps the table bounded by live tokens.
        let now = Utc::now();
        tokens.retain(|_, stored| stored.expires_at > now);
        tokens.insert(
            fingerprint(token),
            StoredToken {
                client_id: client_id.to_string(),
                scope,
                expires_at,
            },
        );
    }

    /// Look up a token; an expired entry is evicted in the same critical section.
    pub async fn check(&self, token: &str, now: DateTime<Utc>) -> TokenLookup {
        let key = fingerprint(token);
        let mut tokens = self.tokens.lock().await;
        let Some(stored) = tokens.get(&key) else {
            return TokenLookup::Unknown;
        };
        if stored.expires_at <= now {
            tokens.remove(&key);
            return TokenLookup::Expired;
        }
        TokenLookup::Valid {
            client_id: stored.client_id.clone(),
            scope: stored.scope.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Accepts tokens from the store; issues them for known clients.
#[derive(Debug, Clone)]
pub struct OAuthStrategy {
    clients: Vec<OAuthClientCredential>,
}

impl OAuthStrategy {
    pub fn new(clients: Vec<OAuthClientCredential>) -> Self {
        Self { clients }
    }

    pub async fn evaluate(
        &self,
        credential: &Credential,
        request: &AuthRequest<'_>,
        store: &TokenStore,
    ) -> StrategyOutcome {
        let Some(token) = credential.bearer_token() else {
            return StrategyOutcome::NotRecognized;
        };
        match store.check(token, Utc::now()).await {
            TokenLookup::Unknown => StrategyOutcome::NotRecognized,
            TokenLookup::Expired => StrategyOutcome::Rejected(AuthError::TokenExpired),
            TokenLookup::Valid { client_id, scope } => {
                AuthScope::new(StrategyKind::BearerOAuth, client_id, &scope)
                    .into_outcome(request.method, request.tenant)
            }
        }
    }

    /// Verify client credentials and store a fresh token.
    pub async fn issue(
        &self,
        client_id: &str,
        client_secret: &str,
        tenant: &str,
        store: &TokenStore,
    ) -> Result<TokenGrant, AuthError> {
        let client = self
            .clients
            .iter()
            .fold(None, |found, entry| {
                let id_ok: bool = entry.client_id.as_bytes().ct_eq(client_id.as_bytes()).into();
                let secret_ok: bool = entry
                    .client_secret
                    .as_bytes()
                    .ct_eq(client_secret.as_bytes())
                    .into();
                found.or((id_ok && secret_ok).then_some(entry))
            })
            .ok_or(AuthError::InvalidClient)?;

        if !client.scope.tenants.is_empty()
            && !client.scope.tenants.iter().any(|t| t.eq_ignore_ascii_case(tenant))
        {
            debug!("Client {} asked for a token for tenant {}", client.client_id, tenant);
            return Err(AuthError::TenantNotAllowed {
                tenant: tenant.to_string(),
            });
        }

        let access_token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let expires_at = Utc::now() + Duration::seconds(client.expires_in.min(MAX_LIFETIME_SECS) as i64);
        store
            .insert(&access_token, &client.client_id, client.scope.clone(), expires_at)
            .await;
        info!(
            "Issued token for client {} (tenant {}, expires {})",
            client.client_id, tenant, expires_at
        );

        Ok(TokenGrant {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: client.expires_in,
        })
    }
}
