//! Shared-secret (HTTP Basic) strategy.

use super::{AuthRequest, AuthScope, Credential, StrategyKind, StrategyOutcome};
use crate::config::BasicCredential;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct BasicStrategy {
    credentials: Vec<BasicCredential>,
}

impl BasicStrategy {
    pub fn new(credentials: Vec<BasicCredential>) -> Self {
        Self { credentials }
    }

    pub fn evaluate(&self, credential: &Credential, request: &AuthRequest<'_>) -> StrategyOutcome {
        let Credential::Basic { username, password } = credential else {
            return StrategyOutcome::NotRecognized;
        };
        // Compare every entry so timing does not reveal which usernames exist.
        let matched = self.credentials.iter().fold(None, |found, entry| {
            let user_ok: bool = entry.username.as_bytes().ct_eq(username.as_bytes()).into();
            let password_ok: bool = entry.password.as_bytes().ct_eq(password.as_bytes()).into();
            found.or((user_ok && password_ok).then_some(entry))
        });
        match matched {
            Some(entry) => AuthScope::new(StrategyKind::Basic, &entry.username, &entry.scope)
                .into_outcome(request.method, request.tenant),
            None => StrategyOutcome::NotRecognized,
        }
    }
}
