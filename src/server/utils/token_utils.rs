//! opaque playback tokens
//!
//! claims are serialized to json, sealed with xsalsa20-poly1305 under a key derived from the
//! server secret and shipped as url safe base64 of `nonce || ciphertext`. the poly1305 tag means
//! any flipped bit fails decryption outright, so there is no partial decode to worry about
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::database::catalog::UserMembership;
use crate::server::error::{AppResult, Error};

const NONCE_LEN: usize = 24;
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackClaims {
    /// provider link the token unlocks
    pub link: String,
    pub user_id: i64,
    pub user_identifier: String,
    /// unix seconds
    pub expires_at: i64,
    pub session_id: String,
}

pub struct PlaybackTokenCipher {
    cipher: XSalsa20Poly1305,
}

// never print key material
impl fmt::Debug for PlaybackTokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaybackTokenCipher { .. }")
    }
}

impl PlaybackTokenCipher {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self {
            cipher: XSalsa20Poly1305::new(Key::from_slice(digest.as_slice())),
        }
    }

    pub fn mint(&self, link: &str, user: &UserMembership, ttl_minutes: i64) -> AppResult<String> {
        self.mint_at(link, user, ttl_minutes, Utc::now().timestamp())
    }

    pub fn mint_at(
        &self,
        link: &str,
        user: &UserMembership,
        ttl_minutes: i64,
        now: i64,
    ) -> AppResult<String> {
        let claims = PlaybackClaims {
            link: link.to_string(),
            user_id: user.user_id,
            user_identifier: user.identifier().to_string(),
            expires_at: now + ttl_minutes * 60,
            session_id: nanoid::nanoid!(),
        };

        let plaintext = serde_json::to_vec(&claims).map_err(|e| {
            Error::InternalServerErrorWithContext(format!("failed to encode claims: {}", e))
        })?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| {
                Error::InternalServerErrorWithContext("failed to seal playback token".to_string())
            })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// `None` for anything garbled, forged, sealed with another key or expired
    pub fn validate(&self, token: &str) -> Option<PlaybackClaims> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub fn validate_at(&self, token: &str, now: i64) -> Option<PlaybackClaims> {
        let blob = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
        if blob.len() <= NONCE_LEN {
            return None;
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;

        let claims: PlaybackClaims = serde_json::from_slice(&plaintext).ok()?;

        if claims.expires_at < now {
            debug!(
                "playback token for user {} expired {}s ago",
                claims.user_id,
                now - claims.expires_at
            );
            return None;
        }

        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_blobs_are_rejected_before_decrypting() {
        let cipher = PlaybackTokenCipher::new("s");
        assert!(cipher.validate(&URL_SAFE_NO_PAD.encode([0u8; NONCE_LEN])).is_none());
        assert!(cipher.validate("").is_none());
    }

    #[test]
    fn debug_hides_key() {
        let cipher = PlaybackTokenCipher::new("super-secret");
        assert!(!format!("{:?}", cipher).contains("super"));
    }
}
