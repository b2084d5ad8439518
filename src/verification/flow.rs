use serde::Serialize;
use std::sync::Arc;

use crate::{
    audit::{AuditEventType, AuditLog},
    cards::CardStore,
    crypto::FieldCipher,
    delivery::{Channel, Delivery},
    error::{AppError, AppResult},
    rate_limit::RateLimiter,
    verification::{CodeSubject, VerificationCodeStore, code_message, is_well_formed},
};

/// Who is asking, and from where.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDescriptor {
    pub channel: Channel,
    pub destination_hint: Option<String>,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedCard {
    pub card_number: String,
    pub cvv: String,
    pub expiry_date: String,
}

/// Gates access to decrypted card data behind a one-time code.
#[derive(Clone)]
pub struct StepUpFlow {
    cards: CardStore,
    codes: VerificationCodeStore,
    cipher: Arc<FieldCipher>,
    delivery: Delivery,
    limiter: Arc<RateLimiter>,
    audit: AuditLog,
}

impl StepUpFlow {
    pub fn new(
        cards: CardStore,
        codes: VerificationCodeStore,
        cipher: Arc<FieldCipher>,
        delivery: Delivery,
        limiter: Arc<RateLimiter>,
        audit: AuditLog,
    ) -> Self {
        Self {
            cards,
            codes,
            cipher,
            delivery,
            limiter,
            audit,
        }
    }

    async fn throttle(&self, action: &str, ctx: &RequestContext, card_id: i64) -> AppResult<()> {
        let key = format!("{action}:{}", ctx.source);
        if let Err(e) = self.limiter.check(&key).await {
            self.audit
                .record_best_effort(AuditEventType::RateLimitExceeded, &ctx.actor, Some(card_id), &ctx.source)
                .await;
            return Err(e);
        }
        Ok(())
    }

    /// Issues a code for `card_id` and sends it out-of-band.
    pub async fn request_verification(
        &self,
        ctx: &RequestContext,
        card_id: i64,
    ) -> AppResult<DeliveryDescriptor> {
        self.throttle("request", ctx, card_id).await?;

        if self.cards.get(card_id).await?.is_none() {
            return Err(AppError::CardNotFound(card_id));
        }

        let issued = self.codes.issue(CodeSubject::Card(card_id)).await?;
        let body = code_message(&issued.code, issued.expires_at);
        let outcome = self.delivery.deliver("Card Verification Code", &body).await;

        self.audit
            .record(AuditEventType::VerificationRequested, &ctx.actor, Some(card_id), &ctx.source)
            .await?;

        Ok(DeliveryDescriptor {
            channel: outcome.channel,
            destination_hint: outcome.destination_hint,
            expires_at: issued.expires_at,
        })
    }

    /// Consumes the pending code and returns the card's plaintext fields.
    pub async fn verify_and_reveal(
        &self,
        ctx: &RequestContext,
        card_id: i64,
        code: &str,
    ) -> AppResult<RevealedCard> {
        self.throttle("verify", ctx, card_id).await?;

        let code = code.trim();
        let validated = if is_well_formed(code) {
            self.codes.validate(CodeSubject::Card(card_id), code).await
        } else {
            Err(AppError::InvalidCode)
        };
        if let Err(e) = validated {
            if e.is_verification_failure() {
                self.audit
                    .record_best_effort(AuditEventType::VerificationFailed, &ctx.actor, Some(card_id), &ctx.source)
                    .await;
            }
            return Err(e);
        }

        let card = self
            .cards
            .get(card_id)
            .await?
            .ok_or(AppError::CardNotFound(card_id))?;

        let revealed = RevealedCard {
            card_number: self.cipher.decrypt(&card.card_number_ciphertext)?,
            cvv: self.cipher.decrypt(&card.cvv_ciphertext)?,
            expiry_date: card.expiry_date,
        };

        self.audit
            .record(AuditEventType::CardRevealed, &ctx.actor, Some(card_id), &ctx.source)
            .await?;

        Ok(revealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cards::NewCardRecord,
        db::{queries, test_pool},
        delivery::testing::{FailingNotifier, RecordingNotifier},
    };
    use std::time::Duration;

    struct Harness {
        flow: StepUpFlow,
        cards: CardStore,
        sms: Arc<RecordingNotifier>,
        pool: sqlx::Pool<sqlx::Sqlite>,
    }

    async fn harness(max_attempts: u32) -> Harness {
        let pool = test_pool().await;
        let cipher = Arc::new(FieldCipher::from_secret("flow-test"));
        let cards = CardStore::new(pool.clone(), cipher.clone());
        let sms = RecordingNotifier::new(Channel::Sms);
        let delivery = Delivery::new(
            sms.clone(),
            "+15555550100",
            RecordingNotifier::new(Channel::Email),
            "ops@example.com",
        );
        let flow = StepUpFlow::new(
            cards.clone(),
            VerificationCodeStore::new(pool.clone(), chrono::Duration::minutes(10)),
            cipher,
            delivery,
            Arc::new(RateLimiter::new(max_attempts, Duration::from_secs(900))),
            AuditLog::new(pool.clone()),
        );
        Harness { flow, cards, sms, pool }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            actor: "admin".to_string(),
            source: "10.0.0.7".to_string(),
        }
    }

    fn card() -> NewCardRecord {
        NewCardRecord {
            customer_name: "Grace Hopper".to_string(),
            email: "grace@example.com".to_string(),
            card_number: "4111111111111111".to_string(),
            cvv: "123".to_string(),
            expiry_date: "12/26".to_string(),
            ..Default::default()
        }
    }

    fn code_from(body: &str) -> String {
        body.chars().filter(|c| c.is_ascii_digit()).take(6).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_reveal() {
        let h = harness(10).await;
        let card_id = h.cards.create(&card()).await.unwrap();

        let stored = h.cards.get(card_id).await.unwrap().unwrap();
        assert_ne!(stored.card_number_ciphertext, "4111111111111111");
        assert_ne!(stored.cvv_ciphertext, "123");

        let descriptor = h.flow.request_verification(&ctx(), card_id).await.unwrap();
        assert_eq!(descriptor.channel, Channel::Sms);
        assert_eq!(descriptor.destination_hint.as_deref(), Some("***0100"));

        let code = code_from(&h.sms.last_body().await.unwrap());
        let revealed = h.flow.verify_and_reveal(&ctx(), card_id, &code).await.unwrap();
        assert_eq!(
            revealed,
            RevealedCard {
                card_number: "4111111111111111".to_string(),
                cvv: "123".to_string(),
                expiry_date: "12/26".to_string(),
            }
        );

        let again = h.flow.verify_and_reveal(&ctx(), card_id, &code).await;
        assert!(again.unwrap_err().is_verification_failure());
    }

    #[tokio::test]
    async fn test_reveal_is_audited() {
        let h = harness(10).await;
        let card_id = h.cards.create(&card()).await.unwrap();
        h.flow.request_verification(&ctx(), card_id).await.unwrap();
        let code = code_from(&h.sms.last_body().await.unwrap());
        h.flow.verify_and_reveal(&ctx(), card_id, &code).await.unwrap();

        let events = queries::list_audit_events(&h.pool, 10).await.unwrap();
        let revealed = events
            .iter()
            .find(|e| e.event_type == "CARD_REVEALED")
            .expect("reveal audit event");
        assert_eq!(revealed.actor, "admin");
        assert_eq!(revealed.target_id, Some(card_id));
        assert_eq!(revealed.source_addr, "10.0.0.7");
        assert!(events.iter().any(|e| e.event_type == "VERIFICATION_REQUESTED"));
    }

    #[tokio::test]
    async fn test_unknown_card() {
        let h = harness(10).await;
        let result = h.flow.request_verification(&ctx(), 404).await;
        assert!(matches!(result, Err(AppError::CardNotFound(404))));
        assert!(h.sms.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_code_reveals_nothing_and_is_audited() {
        let h = harness(10).await;
        let card_id = h.cards.create(&card()).await.unwrap();
        h.flow.request_verification(&ctx(), card_id).await.unwrap();
        let code = code_from(&h.sms.last_body().await.unwrap());
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let result = h.flow.verify_and_reveal(&ctx(), card_id, wrong).await;
        assert!(matches!(result, Err(AppError::InvalidCode)));

        let malformed = h.flow.verify_and_reveal(&ctx(), card_id, "12ab").await;
        assert!(matches!(malformed, Err(AppError::InvalidCode)));

        let events = queries::list_audit_events(&h.pool, 10).await.unwrap();
        assert_eq!(
            events.iter().filter(|e| e.event_type == "VERIFICATION_FAILED").count(),
            2
        );
        assert!(!events.iter().any(|e| e.event_type == "CARD_REVEALED"));
    }

    #[tokio::test]
    async fn test_verify_without_request() {
        let h = harness(10).await;
        let card_id = h.cards.create(&card()).await.unwrap();
        let result = h.flow.verify_and_reveal(&ctx(), card_id, "123456").await;
        assert!(matches!(result, Err(AppError::NoPendingVerification(_))));
    }

    #[tokio::test]
    async fn test_attempts_over_limit_fail_even_with_correct_code() {
        let h = harness(3).await;
        let card_id = h.cards.create(&card()).await.unwrap();
        h.flow.request_verification(&ctx(), card_id).await.unwrap();
        let code = code_from(&h.sms.last_body().await.unwrap());
        let wrong = if code == "111111" { "222222" } else { "111111" };

        for _ in 0..3 {
            assert!(h.flow.verify_and_reveal(&ctx(), card_id, wrong).await.is_err());
        }
        let result = h.flow.verify_and_reveal(&ctx(), card_id, &code).await;
        assert!(matches!(result, Err(AppError::RateLimited { .. })));

        let other_source = RequestContext {
            source: "10.0.0.8".to_string(),
            ..ctx()
        };
        h.flow.verify_and_reveal(&other_source, card_id, &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_fail_request() {
        let pool = test_pool().await;
        let cipher = Arc::new(FieldCipher::from_secret("flow-test"));
        let cards = CardStore::new(pool.clone(), cipher.clone());
        let flow = StepUpFlow::new(
            cards.clone(),
            VerificationCodeStore::new(pool.clone(), chrono::Duration::minutes(10)),
            cipher,
            Delivery::new(
                Arc::new(FailingNotifier(Channel::Sms)),
                "+15555550100",
                Arc::new(FailingNotifier(Channel::Email)),
                "ops@example.com",
            ),
            Arc::new(RateLimiter::new(5, Duration::from_secs(60))),
            AuditLog::new(pool),
        );
        let card_id = cards.create(&card()).await.unwrap();

        let descriptor = flow.request_verification(&ctx(), card_id).await.unwrap();
        assert_eq!(descriptor.channel, Channel::None);
        assert_eq!(descriptor.destination_hint, None);
    }
}
