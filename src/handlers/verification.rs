use axum::{
    Json,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    app_state::AppState,
    error::AppResult,
    handlers::{ClientAddr, Success},
    session::AdminSession,
    verification::RequestContext,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    card_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    card_id: i64,
    code: String,
}

fn context(session: &AdminSession, source: String) -> RequestContext {
    RequestContext {
        actor: session.actor.clone(),
        source,
    }
}

/// POST /verification/request
/// Issues a code for the card and sends it to the admin out-of-band
pub async fn request_verification(
    State(state): State<AppState>,
    session: AdminSession,
    ClientAddr(source): ClientAddr,
    Json(req): Json<VerificationRequest>,
) -> AppResult<Response> {
    let descriptor = state
        .verification
        .request_verification(&context(&session, source), req.card_id)
        .await?;

    Ok(Success::new(descriptor).into_response())
}

/// POST /verification/verify
/// Returns the decrypted card fields when the code checks out
pub async fn verify_code(
    State(state): State<AppState>,
    session: AdminSession,
    ClientAddr(source): ClientAddr,
    Json(req): Json<VerifyRequest>,
) -> AppResult<Response> {
    let revealed = state
        .verification
        .verify_and_reveal(&context(&session, source), req.card_id, &req.code)
        .await?;

    let mut response = Success::new(revealed).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
