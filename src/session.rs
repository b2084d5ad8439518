use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use constant_time_eq::constant_time_eq;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    app_state::AppState,
    crypto::SigningKey,
    db::now_unix,
    error::{AppError, AppResult},
};

/// Identity every admin session acts as.
pub const ADMIN_ACTOR: &str = "admin";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub expires_at: i64,
}

/// An authenticated admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub actor: String,
    pub expires_at: i64,
    nonce: String,
}

/// Issues and checks signed, expiring admin session tokens.
///
/// A token is `<expires_at>.<nonce>.<cmac>` with a fixed expiry; nothing is
/// stored for live sessions, only the nonces of sessions that logged out early.
#[derive(Debug)]
pub struct SessionManager {
    key: SigningKey,
    admin_password: String,
    ttl: chrono::Duration,
    revoked: Mutex<HashMap<String, i64>>,
}

impl SessionManager {
    pub fn new(session_secret: &str, admin_password: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            key: SigningKey::from_secret(session_secret),
            admin_password: admin_password.into(),
            ttl,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    /// First login factor. An empty configured password never matches.
    pub fn check_password(&self, password: &str) -> AppResult<()> {
        if self.admin_password.is_empty()
            || !constant_time_eq(password.as_bytes(), self.admin_password.as_bytes())
        {
            return Err(AppError::Unauthorized);
        }
        Ok(())
    }

    /// Issues a session token. Callers must have checked both login factors.
    pub fn start(&self) -> SessionToken {
        let expires_at = now_unix() + self.ttl.num_seconds();
        let nonce = hex::encode(rand::random::<[u8; 16]>());
        let payload = format!("{expires_at}.{nonce}");
        let tag = hex::encode(self.key.sign(payload.as_bytes()));

        SessionToken {
            token: format!("{payload}.{tag}"),
            expires_at,
        }
    }

    pub async fn authenticate(&self, token: &str) -> AppResult<AdminSession> {
        let (payload, tag_hex) = token.rsplit_once('.').ok_or(AppError::Unauthorized)?;
        let tag = hex::decode(tag_hex).map_err(|_| AppError::Unauthorized)?;
        if !self.key.verify(payload.as_bytes(), &tag) {
            return Err(AppError::Unauthorized);
        }

        let (expires_at, nonce) = payload.split_once('.').ok_or(AppError::Unauthorized)?;
        let expires_at: i64 = expires_at.parse().map_err(|_| AppError::Unauthorized)?;
        if now_unix() >= expires_at {
            return Err(AppError::Unauthorized);
        }
        if self.revoked.lock().await.contains_key(nonce) {
            return Err(AppError::Unauthorized);
        }

        Ok(AdminSession {
            actor: ADMIN_ACTOR.to_string(),
            expires_at,
            nonce: nonce.to_string(),
        })
    }

    pub async fn logout(&self, session: &AdminSession) {
        self.revoked
            .lock()
            .await
            .insert(session.nonce.clone(), session.expires_at);
    }

    /// Forgets revocations for tokens that have expired anyway.
    pub async fn prune_revoked(&self) -> usize {
        let now = now_unix();
        let mut revoked = self.revoked.lock().await;
        let before = revoked.len();
        revoked.retain(|_, expires_at| *expires_at > now);
        before - revoked.len()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        state.sessions.authenticate(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new("secret", "hunter2", chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn test_start_and_authenticate() {
        let sessions = manager();
        let token = sessions.start();
        assert!(token.expires_at > now_unix());

        let session = sessions.authenticate(&token.token).await.unwrap();
        assert_eq!(session.actor, ADMIN_ACTOR);
        assert_eq!(session.expires_at, token.expires_at);
    }

    #[test]
    fn test_wrong_password() {
        assert!(manager().check_password("hunter2").is_ok());
        assert!(matches!(manager().check_password("hunter3"), Err(AppError::Unauthorized)));
        assert!(matches!(manager().check_password(""), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_empty_configured_password_never_matches() {
        let sessions = SessionManager::new("secret", "", chrono::Duration::hours(1));
        assert!(sessions.check_password("").is_err());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let sessions = manager();
        let token = sessions.start().token;
        let (_, rest) = token.split_once('.').unwrap();
        let forged = format!("{}.{rest}", now_unix() + 999_999);

        assert!(sessions.authenticate(&forged).await.is_err());
        assert!(sessions.authenticate("garbage").await.is_err());
        assert!(sessions.authenticate("1.2.zz").await.is_err());
    }

    #[tokio::test]
    async fn test_token_from_other_secret_rejected() {
        let token = manager().start().token;
        let other = SessionManager::new("other", "hunter2", chrono::Duration::hours(1));
        assert!(other.authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let sessions = SessionManager::new("secret", "hunter2", chrono::Duration::zero());
        let token = sessions.start().token;
        assert!(matches!(sessions.authenticate(&token).await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_logout_revokes_only_that_session() {
        let sessions = manager();
        let first = sessions.start().token;
        let second = sessions.start().token;

        let session = sessions.authenticate(&first).await.unwrap();
        sessions.logout(&session).await;

        assert!(sessions.authenticate(&first).await.is_err());
        assert!(sessions.authenticate(&second).await.is_ok());
        assert_eq!(sessions.prune_revoked().await, 0);
    }
}
