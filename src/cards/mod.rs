use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;

use crate::{
    crypto::FieldCipher,
    db::{
        models::CardRecord,
        queries::{self, CardRow},
    },
    error::{AppError, AppResult},
};

/// A card authorization as submitted by a customer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCardRecord {
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub billing_address: String,
    pub card_number: String,
    pub cvv: String,
    pub expiry_date: String,
    pub is_update: bool,
    pub idempotency_key: Option<String>,
}

/// Card fields after validation and normalisation.
#[derive(Debug)]
struct CheckedCard {
    card_number: String,
    cvv: String,
    expiry_date: String,
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn check(record: &NewCardRecord) -> AppResult<CheckedCard> {
    require(&record.customer_name, "customerName")?;
    require(&record.email, "email")?;
    require(&record.card_number, "cardNumber")?;
    require(&record.cvv, "cvv")?;
    require(&record.expiry_date, "expiryDate")?;

    let card_number: String = record
        .card_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if !(13..=19).contains(&card_number.len()) || !card_number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation("cardNumber must be 13 to 19 digits".to_string()));
    }

    let cvv = record.cvv.trim();
    if !(3..=4).contains(&cvv.len()) || !cvv.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation("cvv must be 3 or 4 digits".to_string()));
    }

    let expiry_date = record.expiry_date.trim();
    if !is_valid_expiry(expiry_date) {
        return Err(AppError::Validation("expiryDate must be MM/YY".to_string()));
    }

    Ok(CheckedCard {
        card_number,
        cvv: cvv.to_string(),
        expiry_date: expiry_date.to_string(),
    })
}

fn is_valid_expiry(value: &str) -> bool {
    let Some((month, year)) = value.split_once('/') else {
        return false;
    };
    let digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    digits(month) && digits(year) && matches!(month.parse::<u8>(), Ok(1..=12))
}

fn last_four(card_number: &str) -> &str {
    &card_number[card_number.len().saturating_sub(4)..]
}

/// Card authorization records. Card number and CVV only ever reach the
/// database as ciphertext tokens.
#[derive(Debug, Clone)]
pub struct CardStore {
    pool: Pool<Sqlite>,
    cipher: Arc<FieldCipher>,
}

impl CardStore {
    pub fn new(pool: Pool<Sqlite>, cipher: Arc<FieldCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Stores a submission and returns its id. A repeated idempotency key
    /// returns the id of the first submission instead.
    pub async fn create(&self, record: &NewCardRecord) -> AppResult<i64> {
        let checked = check(record)?;
        let idempotency_key = record
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        if let Some(key) = idempotency_key {
            if let Some(id) = queries::find_card_id_by_idempotency_key(&self.pool, key).await? {
                tracing::info!(card_id = id, "duplicate card submission ignored");
                return Ok(id);
            }
        }

        let card_number_ciphertext = self.cipher.encrypt(&checked.card_number)?;
        let cvv_ciphertext = self.cipher.encrypt(&checked.cvv)?;

        let row = CardRow {
            customer_name: record.customer_name.trim(),
            email: record.email.trim(),
            phone: record.phone.trim(),
            company: record.company.trim(),
            billing_address: record.billing_address.trim(),
            card_number_ciphertext: &card_number_ciphertext,
            cvv_ciphertext: &cvv_ciphertext,
            card_last_four: last_four(&checked.card_number),
            expiry_date: &checked.expiry_date,
            is_update: record.is_update,
            idempotency_key,
        };

        match queries::insert_card_record(&self.pool, &row).await {
            Ok(id) => {
                tracing::info!(card_id = id, is_update = record.is_update, "card record stored");
                Ok(id)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                // Lost a race with a concurrent submission carrying the same key
                let key = idempotency_key.unwrap_or_default();
                queries::find_card_id_by_idempotency_key(&self.pool, key)
                    .await?
                    .ok_or(AppError::Storage(sqlx::Error::Database(e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: i64) -> AppResult<Option<CardRecord>> {
        Ok(queries::get_card_record(&self.pool, id).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<CardRecord>> {
        Ok(queries::list_card_records(&self.pool).await?)
    }

    /// Deletes a record together with its verification codes.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        if !queries::delete_card_record(&mut *tx, id).await? {
            return Err(AppError::CardNotFound(id));
        }
        tx.commit().await?;

        tracing::info!(card_id = id, "card record deleted");
        Ok(())
    }
}
