//! Access token (HS256 JWT) verification and minting.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::AccessKey;
use crate::error::ApiError;

/// Claims carried by an access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Channels the holder may receive messages from.
    #[serde(default)]
    pub read: Vec<String>,
    /// Channels the holder may publish to.
    #[serde(default)]
    pub write: Vec<String>,
    /// Expiry (seconds since epoch). Tokens without `exp` never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Verifies access tokens against the shared secret.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Only `read`/`write` are meaningful; `exp` is still checked when present.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a token and turn its claims into an [`AccessKey`].
    pub fn verify(&self, token: &str) -> Result<AccessKey, ApiError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "access token validation failed");
                ApiError::unauthorized("Invalid or expired access token")
            })?;

        let claims = data.claims;
        Ok(AccessKey::new(claims.sub, claims.read, claims.write))
    }
}

/// Sign `claims` with `secret`.
pub fn mint_access_token(
    secret: &str,
    claims: &AccessClaims,
) -> Result<String, jsonwebtoken::errors::Error> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(read: &[&str], write: &[&str]) -> AccessClaims {
        AccessClaims {
            sub: None,
            read: read.iter().map(|s| s.to_string()).collect(),
            write: write.iter().map(|s| s.to_string()).collect(),
            exp: None,
        }
    }

    #[test]
    fn verify_builds_access_key_from_claims() {
        let token = mint_access_token(SECRET, &claims(&["a", "b"], &["b"])).unwrap();
        let key = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert!(key.can_read("a"));
        assert!(key.can_read("b"));
        assert!(!key.can_write("a"));
        assert!(key.can_write("b"));
        assert!(key.subject_id.is_none());
    }

    #[test]
    fn verify_keeps_subject() {
        let mut c = claims(&[], &[]);
        c.sub = Some("device-7".into());
        let token = mint_access_token(SECRET, &c).unwrap();
        let key = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(key.subject_id.as_deref(), Some("device-7"));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = mint_access_token("other-secret", &claims(&["a"], &["a"])).unwrap();
        let err = TokenVerifier::new(SECRET).verify(&token).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(TokenVerifier::new(SECRET).verify("foo").is_err());
        assert!(TokenVerifier::new(SECRET).verify("").is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let mut c = claims(&["a"], &["a"]);
        c.exp = Some((chrono::Utc::now() - chrono::Duration::hours(1)).timestamp());
        let token = mint_access_token(SECRET, &c).unwrap();
        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn verify_accepts_unexpired_token() {
        let mut c = claims(&["a"], &[]);
        c.exp = Some((chrono::Utc::now() + chrono::Duration::hours(1)).timestamp());
        let token = mint_access_token(SECRET, &c).unwrap();
        assert!(TokenVerifier::new(SECRET).verify(&token).is_ok());
    }

    #[test]
    fn missing_claim_lists_grant_nothing() {
        let token = mint_access_token(SECRET, &AccessClaims::default()).unwrap();
        let key = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert!(!key.can_read("a"));
        assert!(!key.can_write("a"));
    }
}
