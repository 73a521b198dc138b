//! Static bearer tokens and pass-through.

use super::{AuthRequest, AuthScope, Credential, StrategyKind, StrategyOutcome, fingerprint};
use crate::config::{BearerTokenCredential, CredentialScope};
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct StaticBearerStrategy {
    tokens: Vec<BearerTokenCredential>,
}

impl StaticBearerStrategy {
    pub fn new(tokens: Vec<BearerTokenCredential>) -> Self {
        Self { tokens }
    }

    pub fn evaluate(&self, credential: &Credential, request: &AuthRequest<'_>) -> StrategyOutcome {
        let Some(token) = credential.bearer_token() else {
            return StrategyOutcome::NotRecognized;
        };
        let matched = self.tokens.iter().fold(None, |found, entry| {
            let equal: bool = entry.token.as_bytes().ct_eq(token.as_bytes()).into();
            found.or(equal.then_some(entry))
        });
        match matched {
            Some(entry) => {
                // Principal is a short fingerprint; the token itself never reaches logs.
                let principal = fingerprint(&entry.token)[..12].to_string();
                AuthScope::new(StrategyKind::BearerToken, principal, &entry.scope)
                    .into_outcome(request.method, request.tenant)
            }
            None => StrategyOutcome::NotRecognized,
        }
    }
}

/// Accepts any credential and hands it to the connector unchanged.
#[derive(Debug, Clone)]
pub struct PassThroughStrategy {
    scope: CredentialScope,
}

impl PassThroughStrategy {
    pub fn new(scope: CredentialScope) -> Self {
        Self { scope }
    }

    pub fn evaluate(&self, _credential: &Credential, request: &AuthRequest<'_>) -> StrategyOutcome {
        let Some(authorization) = request.authorization else {
            return StrategyOutcome::NotRecognized;
        };
        let mut scope = AuthScope::new(StrategyKind::PassThrough, "passthrough", &self.scope);
        scope.passthrough = Some(authorization.to_string());
        scope.into_outcome(request.method, request.tenant)
    }
}
