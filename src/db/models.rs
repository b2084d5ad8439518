use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CardRecord {
    pub id: i64,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub billing_address: String,
    pub card_number_ciphertext: String,
    pub cvv_ciphertext: String,
    pub card_last_four: String,
    pub expiry_date: String,
    pub is_update: bool,
    pub active: bool,
    pub idempotency_key: Option<String>,
    pub created_at: i64,
}

/// The newest unused code for a subject.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCode {
    pub id: i64,
    pub code_hash: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: i64,
    pub event_type: String,
    pub actor: String,
    pub target_id: Option<i64>,
    pub source_addr: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_code: String,
    pub available_quantity: i64,
}
