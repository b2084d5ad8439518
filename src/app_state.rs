use sqlx::{Pool, Sqlite};
use std::sync::Arc;

use crate::{
    audit::AuditLog,
    cards::CardStore,
    config::Config,
    crypto::FieldCipher,
    delivery::{Delivery, Notifier},
    inventory::Inventory,
    rate_limit::RateLimiter,
    session::SessionManager,
    verification::{AdminLoginFlow, StepUpFlow, VerificationCodeStore},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub cards: CardStore,
    pub codes: VerificationCodeStore,
    pub verification: StepUpFlow,
    pub login: AdminLoginFlow,
    pub inventory: Inventory,
    pub sessions: Arc<SessionManager>,
    pub limiter: Arc<RateLimiter>,
    pub audit: AuditLog,
}

impl AppState {
    pub fn new(
        pool: Pool<Sqlite>,
        config: Arc<Config>,
        sms: Arc<dyn Notifier>,
        email: Arc<dyn Notifier>,
    ) -> Self {
        let cipher = Arc::new(FieldCipher::from_secret(&config.card_encryption_secret));
        let delivery = Delivery::new(sms, &config.admin_phone, email, &config.admin_email);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_attempts,
            config.rate_limit_window(),
        ));
        let audit = AuditLog::new(pool.clone());
        let cards = CardStore::new(pool.clone(), cipher.clone());
        let codes = VerificationCodeStore::new(pool.clone(), config.code_ttl());
        let verification = StepUpFlow::new(
            cards.clone(),
            codes.clone(),
            cipher,
            delivery.clone(),
            limiter.clone(),
            audit.clone(),
        );
        let sessions = Arc::new(SessionManager::new(
            &config.session_secret,
            config.admin_password.clone(),
            config.session_ttl(),
        ));
        let login = AdminLoginFlow::new(
            VerificationCodeStore::new(pool.clone(), config.admin_code_ttl()),
            sessions.clone(),
            delivery.clone(),
            limiter.clone(),
            audit.clone(),
        );

        Self {
            inventory: Inventory::new(pool.clone(), delivery),
            pool,
            config,
            cards,
            codes,
            verification,
            login,
            sessions,
            limiter,
            audit,
        }
    }

    /// Removes state that can no longer affect any request.
    pub async fn cleanup(&self) {
        match self.codes.purge_expired().await {
            Ok(purged) if purged > 0 => tracing::debug!(purged, "expired verification codes removed"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "verification code cleanup failed"),
        }
        let windows = self.limiter.prune().await;
        let revoked = self.sessions.prune_revoked().await;
        tracing::trace!(windows, revoked, "in-memory state pruned");
    }
}
