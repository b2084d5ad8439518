use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    app_state::AppState,
    audit::AuditEventType,
    cards::NewCardRecord,
    db::models::CardRecord,
    error::AppResult,
    handlers::{ClientAddr, Done, Success},
    session::AdminSession,
};

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
}

/// Admin view of a card record. Ciphertext stays on the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub id: i64,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub billing_address: String,
    pub card_last_four: String,
    pub expiry_date: String,
    pub is_update: bool,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<CardRecord> for CardSummary {
    fn from(record: CardRecord) -> Self {
        Self {
            id: record.id,
            customer_name: record.customer_name,
            email: record.email,
            phone: record.phone,
            company: record.company,
            billing_address: record.billing_address,
            card_last_four: record.card_last_four,
            expiry_date: record.expiry_date,
            is_update: record.is_update,
            active: record.active,
            created_at: DateTime::from_timestamp(record.created_at, 0),
        }
    }
}

/// POST /cards
/// Customer-facing card authorization submission
pub async fn create_card(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    headers: HeaderMap,
    Json(mut req): Json<NewCardRecord>,
) -> AppResult<Json<Success<Created>>> {
    if req.idempotency_key.is_none() {
        req.idempotency_key = headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    let id = state.cards.create(&req).await?;
    state
        .audit
        .record_best_effort(AuditEventType::CardCreated, "customer", Some(id), &source)
        .await;

    Ok(Success::new(Created { id }))
}

/// GET /cards
pub async fn list_cards(
    State(state): State<AppState>,
    _session: AdminSession,
) -> AppResult<Json<Vec<CardSummary>>> {
    let records = state.cards.list().await?;
    Ok(Json(records.into_iter().map(CardSummary::from).collect()))
}

/// DELETE /cards/{id}
pub async fn delete_card(
    State(state): State<AppState>,
    session: AdminSession,
    ClientAddr(source): ClientAddr,
    Path(id): Path<i64>,
) -> AppResult<Json<Success<Done>>> {
    state.cards.delete(id).await?;
    state
        .audit
        .record_best_effort(AuditEventType::CardDeleted, &session.actor, Some(id), &source)
        .await;

    Ok(Success::new(Done {}))
}
