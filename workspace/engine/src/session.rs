//! Signed session tokens.
//!
//! A session is an HS256 JWT naming the user it was issued to. Logging out
//! does not invalidate the signature, so revoked token ids are remembered in
//! a cache for as long as any token can stay valid.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::error::{DeskError, Result};

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// User id
    pub sub: i32,
    pub username: String,
    /// Unique token id, the unit of revocation
    pub jti: String,
    /// Expiration as a unix timestamp
    pub exp: i64,
}

/// A freshly issued token together with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, verifies and revokes session tokens.
#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    revoked: Cache<String, ()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .field("revoked", &self.revoked.entry_count())
            .finish_non_exhaustive()
    }
}

/// Longest session lifetime accepted, one year.
pub const MAX_TTL_HOURS: u64 = 24 * 366;

impl SessionManager {
    /// `ttl_hours` is clamped to `1..=MAX_TTL_HOURS`.
    pub fn new(secret: &str, ttl_hours: u64) -> Self {
        let ttl_hours = ttl_hours.clamp(1, MAX_TTL_HOURS);
        let revoked = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(StdDuration::from_secs(ttl_hours * 3600))
            .build();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours as i64),
            revoked,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a new token for the given user.
    #[instrument(skip(self))]
    pub fn issue(&self, user_id: i32, username: &str) -> Result<IssuedSession> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| DeskError::Credential("session expiry overflow".to_string()))?;

        let claims = SessionClaims {
            sub: user_id,
            username: username.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DeskError::Credential(format!("failed to sign session: {e}")))?;

        debug!(user_id = user_id, jti = %claims.jti, "Issued session token");
        Ok(IssuedSession { token, expires_at })
    }

    /// Decode a token, returning `None` when it is malformed, expired, signed
    /// with another key or revoked.
    pub async fn verify(&self, token: &str) -> Option<SessionClaims> {
        let claims = match decode::<SessionClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!("Rejected session token: {}", e);
                return None;
            }
        };

        if self.revoked.contains_key(&claims.jti) {
            debug!(jti = %claims.jti, "Rejected revoked session token");
            return None;
        }

        trace!(user_id = claims.sub, "Session token verified");
        Some(claims)
    }

    /// Revoke a token. Returns false when the token was not valid to begin
    /// with.
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str) -> bool {
        match self.verify(token).await {
            Some(claims) => {
                self.revoked.insert(claims.jti.clone(), ()).await;
                debug!(user_id = claims.sub, jti = %claims.jti, "Session revoked");
                true
            }
            None => {
                warn!("Attempted to revoke an invalid session token");
                false
            }
        }
    }
}
