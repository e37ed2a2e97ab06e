//! Token issuing and verification (HS256 JWT).

use chrono::{DateTime, Duration, DurationRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use warden_core::SubjectId;

use crate::claims::{TokenClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    BadSignature,
}

impl From<TokenValidationError> for TokenError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => TokenError::Expired,
            other => TokenError::Malformed(other.to_string()),
        }
    }
}

/// Verifies tokens and returns their claims.
///
/// Pure function of the key and the supplied clock: no store is consulted.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError>;
}

/// A freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HMAC-SHA256 token service with a fixed time-to-live.
pub struct Hs256TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl core::fmt::Debug for Hs256TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Hs256TokenService {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `subject_id`, valid from `now` for the configured TTL.
    pub fn issue(
        &self,
        subject_id: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        // Claims carry whole seconds; truncate so the returned expiry matches the token.
        let issued_at = now.duration_trunc(Duration::seconds(1)).unwrap_or(now);
        let claims = TokenClaims {
            subject_id: subject_id.clone(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);
        validation
    }
}

impl TokenVerifier for Hs256TokenService {
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &Self::validation())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::BadSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
