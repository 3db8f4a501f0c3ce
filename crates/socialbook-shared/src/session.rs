//! Signed bearer tokens.
//!
//! The server signs `user_id || valid_until` with its Ed25519 key and hands
//! the result to the client as an opaque base64url string. The same
//! verification runs for REST requests and for the realtime `join` event.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub user_id: UserId,
    pub valid_until: DateTime<Utc>,
    pub signature: Vec<u8>,
}

impl SessionToken {
    /// Encode for the `Authorization: Bearer` header.
    pub fn encode(&self) -> String {
        // Serializing a plain struct of ids, timestamps and bytes cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(bearer: &str) -> Result<Self, SessionError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(bearer.trim())
            .map_err(|_| SessionError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| SessionError::Malformed)
    }
}

fn signing_payload(user_id: &UserId, valid_until: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.0.as_bytes());
    payload.extend_from_slice(valid_until.to_rfc3339().as_bytes());
    payload
}

pub fn create_session_token(
    user_id: UserId,
    valid_until: DateTime<Utc>,
    signing_key: &SigningKey,
) -> SessionToken {
    let signature = signing_key.sign(&signing_payload(&user_id, &valid_until));

    SessionToken {
        user_id,
        valid_until,
        signature: signature.to_bytes().to_vec(),
    }
}

pub fn verify_session_token_with_key(
    token: &SessionToken,
    server_pubkey: &[u8; 32],
    now: DateTime<Utc>,
) -> Result<UserId, SessionError> {
    if now > token.valid_until {
        return Err(SessionError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(server_pubkey).map_err(|_| SessionError::InvalidKey)?;
    let signature =
        Signature::from_slice(&token.signature).map_err(|_| SessionError::BadSignature)?;

    verifying_key
        .verify(&signing_payload(&token.user_id, &token.valid_until), &signature)
        .map_err(|_| SessionError::BadSignature)?;

    Ok(token.user_id)
}

/// The server's token signing key plus the configured token lifetime.
#[derive(Clone)]
pub struct SessionKeys {
    signing_key: SigningKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn generate(ttl: Duration) -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            ttl,
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32], ttl: Duration) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
            ttl,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Issue an encoded bearer token for `user_id`, valid from `now` for the
    /// configured lifetime.
    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> String {
        create_session_token(user_id, now + self.ttl, &self.signing_key).encode()
    }

    /// Decode and verify an encoded bearer token.
    pub fn verify(&self, bearer: &str, now: DateTime<Utc>) -> Result<UserId, SessionError> {
        let token = SessionToken::decode(bearer)?;
        verify_session_token_with_key(&token, &self.public_key_bytes(), now)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("public_key", &self.public_key_bytes())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_valid() {
        let keys = SessionKeys::generate(Duration::days(7));
        let user = UserId::new();
        let now = Utc::now();

        let bearer = keys.issue(user, now);
        assert_eq!(keys.verify(&bearer, now), Ok(user));
    }

    #[test]
    fn test_session_token_expired() {
        let keys = SessionKeys::generate(Duration::hours(1));
        let now = Utc::now();
        let bearer = keys.issue(UserId::new(), now);

        let later = now + Duration::hours(2);
        assert_eq!(keys.verify(&bearer, later), Err(SessionError::Expired));
    }

    #[test]
    fn test_session_token_wrong_server_key() {
        let keys = SessionKeys::generate(Duration::days(7));
        let other = SessionKeys::generate(Duration::days(7));
        let now = Utc::now();

        let bearer = keys.issue(UserId::new(), now);
        assert_eq!(other.verify(&bearer, now), Err(SessionError::BadSignature));
    }

    #[test]
    fn test_session_token_forged_user() {
        let keys = SessionKeys::generate(Duration::days(7));
        let now = Utc::now();

        let mut token = SessionToken::decode(&keys.issue(UserId::new(), now)).unwrap();
        token.user_id = UserId::new();

        assert_eq!(
            keys.verify(&token.encode(), now),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn test_session_token_garbage() {
        let keys = SessionKeys::generate(Duration::days(7));
        assert_eq!(
            keys.verify("definitely not a token", Utc::now()),
            Err(SessionError::Malformed)
        );
    }

    #[test]
    fn test_keys_from_secret_are_deterministic() {
        let a = SessionKeys::from_secret_bytes(&[7u8; 32], Duration::days(1));
        let b = SessionKeys::from_secret_bytes(&[7u8; 32], Duration::days(1));
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());

        let now = Utc::now();
        let user = UserId::new();
        assert_eq!(b.verify(&a.issue(user, now), now), Ok(user));
    }
}
