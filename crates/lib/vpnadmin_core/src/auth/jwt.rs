//! JWT token generation and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::warn;

use crate::models::Role;
use crate::models::auth::{IssuedToken, TokenClaims};

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Token parse/sign failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token is malformed")]
    Malformed,

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            _ => TokenError::Malformed,
        }
    }
}

/// Signs and verifies HS256 bearer tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a token for the given subject. `iat` and `nbf` are now.
    pub fn issue(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken {
            token,
            expires_in: ttl.num_seconds(),
            expires_at,
        })
    }

    /// Verify signature and time claims, returning the claims on success.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);
        let data = decode::<TokenClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Decode claims without checking the signature or time claims.
    ///
    /// Only for recovering the expiry of a token being revoked; never use the
    /// result to authorize anything.
    pub fn parse_unverified(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        let data = decode::<TokenClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Use the configured JWT secret, falling back to a random per-process
/// secret (tokens then do not survive a restart).
pub fn resolve_jwt_secret(configured: Option<String>) -> String {
    if let Some(secret) = configured
        && !secret.is_empty()
    {
        return secret;
    }
    warn!("JWT_SECRET not set; generated an ephemeral signing secret");
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"test-secret")
    }

    #[test]
    fn issued_token_parses_back() {
        let issued = codec()
            .issue(42, "alice", Role::Manager, Duration::hours(1))
            .unwrap();
        assert_eq!(issued.expires_in, 3600);

        let claims = codec().parse(&issued.token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.nbf, claims.iat);
    }

    #[test]
    fn foreign_secret_fails_signature_check() {
        let issued = TokenCodec::new(b"other-secret")
            .issue(1, "bob", Role::User, Duration::hours(1))
            .unwrap();
        assert_eq!(
            codec().parse(&issued.token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn expired_token_reports_expiry() {
        let issued = codec()
            .issue(1, "bob", Role::User, Duration::hours(-2))
            .unwrap();
        assert_eq!(codec().parse(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn future_nbf_reports_not_yet_valid() {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "1".into(),
            username: "bob".into(),
            role: Role::User,
            iat: now,
            nbf: now + 3600,
            exp: now + 7200,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert_eq!(codec().parse(&token), Err(TokenError::NotYetValid));
    }

    #[test]
    fn configured_secret_wins_over_generated() {
        assert_eq!(resolve_jwt_secret(Some("s3cret".into())), "s3cret");
        let a = resolve_jwt_secret(None);
        let b = resolve_jwt_secret(Some(String::new()));
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(codec().parse("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(codec().parse(""), Err(TokenError::Malformed));
    }

    #[test]
    fn unverified_parse_recovers_expiry_of_foreign_or_expired_tokens() {
        let expired = codec()
            .issue(7, "carol", Role::Admin, Duration::hours(-2))
            .unwrap();
        let claims = codec().parse_unverified(&expired.token).unwrap();
        assert_eq!(claims.exp, expired.expires_at.timestamp());

        let foreign = TokenCodec::new(b"other")
            .issue(7, "carol", Role::Admin, Duration::hours(1))
            .unwrap();
        assert_eq!(
            codec().parse_unverified(&foreign.token).unwrap().username,
            "carol"
        );
    }
}
