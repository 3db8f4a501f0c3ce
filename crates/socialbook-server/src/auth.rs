//! Password hashing and bearer-token authentication.
//!
//! REST handlers take an [`AuthUser`] extractor; the realtime `join` runs
//! the same [`authenticate`] check on the token it carries.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use socialbook_store::{StoreError, User};

use crate::error::ServerError;
use crate::state::AppState;

/// Hash a password into a PHC string (Argon2id, random salt).
pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Resolve a bearer token to a live, non-banned account.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ServerError> {
    let user_id = state.sessions.verify(token, state.now()).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        ServerError::Unauthorized("Invalid or expired token".into())
    })?;

    let user = {
        let db = state.db.lock().await;
        db.get_user(user_id)
    };
    let user = match user {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(ServerError::Unauthorized("Account no longer exists".into()))
        }
        Err(e) => return Err(e.into()),
    };

    if user.is_banned {
        return Err(ServerError::Forbidden("Account is banned".into()));
    }
    Ok(user)
}

/// The caller of an authenticated endpoint.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ServerError> {
        if self.0.is_admin || self.0.is_owner {
            Ok(())
        } else {
            Err(ServerError::Forbidden("Admin access required".into()))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".into()))?
            .trim();

        authenticate(state, token).await.map(AuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use socialbook_shared::UserId;
    use socialbook_store::NewUser;

    use crate::state::test_support::test_state;

    #[test]
    fn test_password_round_trip() {
        let phc = hash_password("correct horse").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password("correct horse", &phc));
        assert!(!verify_password("battery staple", &phc));
        assert!(!verify_password("correct horse", "not a hash"));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let state = test_state();
        let user = state
            .db
            .lock()
            .await
            .create_user(
                &NewUser {
                    first_name: "Ada".into(),
                    last_name: "L".into(),
                    email: "ada@example.com".into(),
                    password_hash: "x".into(),
                    avatar: String::new(),
                    is_admin: false,
                    is_owner: false,
                },
                Utc::now(),
            )
            .unwrap();

        let token = state.sessions.issue(user.id, state.now());
        assert_eq!(authenticate(&state, &token).await.unwrap().id, user.id);

        assert!(matches!(
            authenticate(&state, "garbage").await,
            Err(ServerError::Unauthorized(_))
        ));

        state.db.lock().await.set_banned(user.id, true).unwrap();
        assert!(matches!(
            authenticate(&state, &token).await,
            Err(ServerError::Forbidden(_))
        ));

        let ghost = state.sessions.issue(UserId::new(), state.now());
        assert!(matches!(
            authenticate(&state, &ghost).await,
            Err(ServerError::Unauthorized(_))
        ));
    }
}
