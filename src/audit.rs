use sqlx::{Pool, Sqlite};

use crate::{db::queries, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    AdminCodeRequested,
    AdminLogin,
    AdminLoginFailed,
    CardCreated,
    CardDeleted,
    VerificationRequested,
    VerificationFailed,
    CardRevealed,
    RateLimitExceeded,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminCodeRequested => "ADMIN_CODE_REQUESTED",
            Self::AdminLogin => "ADMIN_LOGIN",
            Self::AdminLoginFailed => "ADMIN_LOGIN_FAILED",
            Self::CardCreated => "CARD_CREATED",
            Self::CardDeleted => "CARD_DELETED",
            Self::VerificationRequested => "VERIFICATION_REQUESTED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::CardRevealed => "CARD_REVEALED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }
}

/// Append-only record of security relevant events.
#[derive(Debug, Clone)]
pub struct AuditLog {
    pool: Pool<Sqlite>,
}

impl AuditLog {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        event: AuditEventType,
        actor: &str,
        target_id: Option<i64>,
        source_addr: &str,
    ) -> AppResult<()> {
        queries::insert_audit_event(&self.pool, event.as_str(), actor, target_id, source_addr).await?;
        tracing::info!(event = event.as_str(), actor, target_id, source_addr, "audit");
        Ok(())
    }

    /// Records an event whose loss must not fail the surrounding request.
    pub async fn record_best_effort(
        &self,
        event: AuditEventType,
        actor: &str,
        target_id: Option<i64>,
        source_addr: &str,
    ) {
        if let Err(e) = self.record(event, actor, target_id, source_addr).await {
            tracing::error!(event = event.as_str(), error = %e, "failed to write audit event");
        }
    }
}
