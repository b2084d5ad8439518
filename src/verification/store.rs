use constant_time_eq::constant_time_eq;
use sqlx::{Pool, Sqlite};
use std::fmt;

use crate::{
    crypto::{code_digest, login_code_digest},
    db::{now_unix, queries},
    error::{AppError, AppResult},
    verification::generate_code,
};

/// What a code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSubject {
    /// Reveal of one card record.
    Card(i64),
    /// The second step of an admin login.
    AdminLogin,
}

impl CodeSubject {
    fn card_id(self) -> Option<i64> {
        match self {
            Self::Card(id) => Some(id),
            Self::AdminLogin => None,
        }
    }

    fn digest(self, code: &str) -> String {
        match self {
            Self::Card(id) => code_digest(id, code),
            Self::AdminLogin => login_code_digest(code),
        }
    }
}

impl fmt::Display for CodeSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card(id) => write!(f, "card {id}"),
            Self::AdminLogin => f.write_str("admin login"),
        }
    }
}

/// A freshly issued code. The plaintext only lives here, on its way to delivery.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

/// Persists one-time codes, at most one live code per subject.
#[derive(Debug, Clone)]
pub struct VerificationCodeStore {
    pool: Pool<Sqlite>,
    ttl: chrono::Duration,
}

impl VerificationCodeStore {
    pub fn new(pool: Pool<Sqlite>, ttl: chrono::Duration) -> Self {
        Self { pool, ttl }
    }

    /// Issues a new code for `subject`, retiring any code still pending for it.
    pub async fn issue(&self, subject: CodeSubject) -> AppResult<IssuedCode> {
        let code = generate_code();
        let expires_at = now_unix() + self.ttl.num_seconds();

        // Starts with a write so the transaction takes the write lock up front
        let mut tx = self.pool.begin().await?;
        let retired = queries::retire_pending_codes(&mut *tx, subject.card_id()).await?;
        queries::insert_verification_code(&mut *tx, subject.card_id(), &subject.digest(&code), expires_at)
            .await?;
        tx.commit().await?;

        tracing::debug!(%subject, retired, expires_at, "verification code issued");

        Ok(IssuedCode {
            code,
            expires_at,
        })
    }

    /// Consumes the pending code for `subject` if `submitted` matches it.
    ///
    /// The read and the consume are separate statements; the consume
    /// re-checks every condition, so of two racing callers exactly one wins
    /// and the other sees a verification failure.
    pub async fn validate(&self, subject: CodeSubject, submitted: &str) -> AppResult<()> {
        let pending = queries::latest_pending_code(&self.pool, subject.card_id())
            .await?
            .ok_or(AppError::NoPendingVerification(subject))?;

        let now = now_unix();
        if now >= pending.expires_at {
            return Err(AppError::CodeExpired);
        }

        let digest = subject.digest(submitted);
        if !constant_time_eq(digest.as_bytes(), pending.code_hash.as_bytes()) {
            return Err(AppError::InvalidCode);
        }

        if !queries::consume_code(&self.pool, pending.id, &digest, now).await? {
            return Err(AppError::InvalidCode);
        }
        Ok(())
    }

    /// Removes codes that can no longer be validated.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        Ok(queries::purge_spent_codes(&self.pool, now_unix()).await?)
    }
}
