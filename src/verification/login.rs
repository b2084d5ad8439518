use serde::Serialize;
use std::sync::Arc;

use crate::{
    audit::{AuditEventType, AuditLog},
    delivery::Delivery,
    error::{AppError, AppResult},
    rate_limit::RateLimiter,
    session::{ADMIN_ACTOR, SessionManager, SessionToken},
    verification::{CodeSubject, RequestContext, VerificationCodeStore, code_message, is_well_formed},
};

/// Actor recorded for login attempts that have not proven anything yet.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginChallenge {
    pub expires_at: i64,
}

/// Two-factor admin login: the password earns an emailed code, and only the
/// code earns a session.
#[derive(Clone)]
pub struct AdminLoginFlow {
    codes: VerificationCodeStore,
    sessions: Arc<SessionManager>,
    delivery: Delivery,
    limiter: Arc<RateLimiter>,
    audit: AuditLog,
}

impl AdminLoginFlow {
    pub fn new(
        codes: VerificationCodeStore,
        sessions: Arc<SessionManager>,
        delivery: Delivery,
        limiter: Arc<RateLimiter>,
        audit: AuditLog,
    ) -> Self {
        Self {
            codes,
            sessions,
            delivery,
            limiter,
            audit,
        }
    }

    async fn throttle(&self, action: &str, ctx: &RequestContext) -> AppResult<()> {
        if let Err(e) = self.limiter.check(&format!("{action}:{}", ctx.source)).await {
            self.audit
                .record_best_effort(AuditEventType::RateLimitExceeded, &ctx.actor, None, &ctx.source)
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// Checks the password and emails a login code.
    pub async fn request_code(&self, ctx: &RequestContext, password: &str) -> AppResult<LoginChallenge> {
        self.throttle("login", ctx).await?;

        if let Err(e) = self.sessions.check_password(password) {
            self.audit
                .record_best_effort(AuditEventType::AdminLoginFailed, ANONYMOUS, None, &ctx.source)
                .await;
            return Err(e);
        }

        let issued = self.codes.issue(CodeSubject::AdminLogin).await?;
        self.delivery
            .email("Admin Verification Code", &code_message(&issued.code, issued.expires_at))
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        self.audit
            .record_best_effort(AuditEventType::AdminCodeRequested, ANONYMOUS, None, &ctx.source)
            .await;

        Ok(LoginChallenge {
            expires_at: issued.expires_at,
        })
    }

    /// Consumes the emailed code and starts a session.
    pub async fn verify_code(&self, ctx: &RequestContext, code: &str) -> AppResult<SessionToken> {
        self.throttle("login-verify", ctx).await?;

        let code = code.trim();
        let validated = if is_well_formed(code) {
            self.codes.validate(CodeSubject::AdminLogin, code).await
        } else {
            Err(AppError::InvalidCode)
        };
        if let Err(e) = validated {
            if e.is_verification_failure() {
                self.audit
                    .record_best_effort(AuditEventType::AdminLoginFailed, ANONYMOUS, None, &ctx.source)
                    .await;
            }
            return Err(e);
        }

        let token = self.sessions.start();
        self.audit
            .record_best_effort(AuditEventType::AdminLogin, ADMIN_ACTOR, None, &ctx.source)
            .await;

        Ok(token)
    }
}
