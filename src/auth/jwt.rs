//! Signed bearer tokens.
//!
//! Two flavours share this strategy: generic tokens (`bearerJwt`) where the key decides
//! whether a token is ours, and named-issuer tokens (`bearerJwtIssuer`) where the `iss`
//! claim decides and issuer, audience and the optional `tid` claim are pinned.

use super::{AuthError, AuthRequest, AuthScope, Credential, StrategyKind, StrategyOutcome};
use crate::config::{ConfigurationError, CredentialScope, JwtCredential, JwtIssuerCredential, JwtKey};
use base64::{Engine as _, engine::general_purpose};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use log::debug;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Default, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    tid: Option<String>,
}

struct Verifier {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
    issuer: Option<String>,
    audience: Option<String>,
    allowed_tenant_ids: Vec<String>,
    scope: CredentialScope,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("algorithms", &self.algorithms)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

fn decoding_key(key: &JwtKey) -> Result<(DecodingKey, Vec<Algorithm>), ConfigurationError> {
    match (&key.secret, &key.public_key) {
        (Some(secret), None) => Ok((
            DecodingKey::from_secret(secret.as_bytes()),
            vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
        )),
        (None, Some(pem)) => {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                ConfigurationError::ValidationError {
                    message: format!("invalid RSA public key: {}", e),
                }
            })?;
            Ok((key, vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512]))
        }
        _ => Err(ConfigurationError::ValidationError {
            message: "JWT entries need exactly one of 'secret' or 'publicKey'".to_string(),
        }),
    }
}

/// Read the payload without verifying it, to route a token to its issuer's key.
fn peek_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

impl Verifier {
    /// `None` when the token is not for this verifier.
    fn check(&self, token: &str, algorithm: Algorithm, pinned: bool) -> Option<Result<Claims, AuthError>> {
        if !self.algorithms.contains(&algorithm) {
            return None;
        }
        if pinned {
            let claims = peek_claims(token)?;
            if claims.iss.as_deref() != self.issuer.as_deref() {
                return None;
            }
        }

        let mut validation = Validation::new(algorithm);
        validation.algorithms = self.algorithms.clone();
        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let claims = match decode::<Claims>(token, &self.key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!("JWT validation failed: {}", e);
                return match e.kind() {
                    JwtErrorKind::InvalidSignature if !pinned => None,
                    JwtErrorKind::ExpiredSignature => Some(Err(AuthError::TokenExpired)),
                    JwtErrorKind::InvalidIssuer => Some(Err(AuthError::InvalidToken {
                        reason: "unexpected issuer".to_string(),
                    })),
                    JwtErrorKind::InvalidAudience => Some(Err(AuthError::InvalidToken {
                        reason: "unexpected audience".to_string(),
                    })),
                    _ => Some(Err(AuthError::InvalidToken {
                        reason: e.to_string(),
                    })),
                };
            }
        };

        if !self.allowed_tenant_ids.is_empty() {
            let allowed = claims
                .tid
                .as_deref()
                .is_some_and(|tid| self.allowed_tenant_ids.iter().any(|a| a == tid));
            if !allowed {
                return Some(Err(AuthError::InvalidToken {
                    reason: "tenant id claim not allowed".to_string(),
                }));
            }
        }
        Some(Ok(claims))
    }
}

#[derive(Debug)]
pub struct JwtStrategy {
    kind: StrategyKind,
    verifiers: Vec<Verifier>,
}

impl JwtStrategy {
    pub fn generic(entries: &[JwtCredential]) -> Result<Self, ConfigurationError> {
        let verifiers = entries
            .iter()
            .map(|entry| {
                let (key, algorithms) = decoding_key(&entry.key)?;
                Ok(Verifier {
                    key,
                    algorithms,
                    issuer: entry.issuer.clone(),
                    audience: entry.audience.clone(),
                    allowed_tenant_ids: Vec::new(),
                    scope: entry.scope.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        Ok(Self {
            kind: StrategyKind::BearerJwt,
            verifiers,
        })
    }

    pub fn named_issuer(entries: &[JwtIssuerCredential]) -> Result<Self, ConfigurationError> {
        let verifiers = entries
            .iter()
            .map(|entry| {
                let (key, algorithms) = decoding_key(&entry.key)?;
                Ok(Verifier {
                    key,
                    algorithms,
                    issuer: Some(entry.issuer.clone()),
                    audience: Some(entry.audience.clone()),
                    allowed_tenant_ids: entry.allowed_tenant_ids.clone(),
                    scope: entry.scope.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        Ok(Self {
            kind: StrategyKind::BearerJwtIssuer,
            verifiers,
        })
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn evaluate(&self, credential: &Credential, request: &AuthRequest<'_>) -> StrategyOutcome {
        let Some(token) = credential.bearer_token() else {
            return StrategyOutcome::NotRecognized;
        };
        let Ok(header) = decode_header(token) else {
            return StrategyOutcome::NotRecognized;
        };
        let pinned = self.kind == StrategyKind::BearerJwtIssuer;

        let mut rejection = None;
        for verifier in &self.verifiers {
            match verifier.check(token, header.alg, pinned) {
                None => {}
                Some(Ok(claims)) => {
                    let principal = claims.sub.unwrap_or_else(|| "jwt".to_string());
                    return AuthScope::new(self.kind, principal, &verifier.scope)
                        .into_outcome(request.method, request.tenant);
                }
                Some(Err(e)) => {
                    rejection.get_or_insert(e);
                }
            }
        }
        rejection.map_or(StrategyOutcome::NotRecognized, StrategyOutcome::Rejected)
    }
}
