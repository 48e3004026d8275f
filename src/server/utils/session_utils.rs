use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// user id
    pub sub: i64,
    pub exp: i64,
    pub iat: i64,
}

/// hs256 keys for the viewer session jwt
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: i64, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        match decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("rejected session token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_sessions_verify() {
        let keys = SessionKeys::new("session-secret");
        let token = keys.issue(42, Duration::hours(1)).unwrap();
        assert_eq!(keys.verify(&token).map(|c| c.sub), Some(42));
    }

    #[test]
    fn foreign_and_expired_sessions_are_rejected() {
        let keys = SessionKeys::new("session-secret");
        let other = SessionKeys::new("other-secret");

        let token = other.issue(42, Duration::hours(1)).unwrap();
        assert!(keys.verify(&token).is_none());

        // well past the default 60s leeway
        let expired = keys.issue(42, Duration::hours(-2)).unwrap();
        assert!(keys.verify(&expired).is_none());
    }
}
