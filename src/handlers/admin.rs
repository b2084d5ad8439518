use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    app_state::AppState,
    db::{models::AuditEvent, queries},
    error::{AppError, AppResult},
    handlers::{ClientAddr, Done, Success},
    session::{AdminSession, SessionToken},
    verification::{
        RequestContext,
        login::{ANONYMOUS, LoginChallenge},
    },
};

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeSubmission {
    code: String,
}

fn anonymous(source: String) -> RequestContext {
    RequestContext {
        actor: ANONYMOUS.to_string(),
        source,
    }
}

/// POST /api/admin/request-code
/// Checks the password and emails a login code
pub async fn request_code(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    Json(req): Json<CodeRequest>,
) -> AppResult<Json<Success<LoginChallenge>>> {
    let challenge = state.login.request_code(&anonymous(source), &req.password).await?;
    Ok(Success::new(challenge))
}

/// POST /api/admin/verify-code
/// Exchanges the emailed code for a session token
pub async fn verify_code(
    State(state): State<AppState>,
    ClientAddr(source): ClientAddr,
    Json(req): Json<CodeSubmission>,
) -> AppResult<Json<Success<SessionToken>>> {
    let token = state.login.verify_code(&anonymous(source), &req.code).await?;
    Ok(Success::new(token))
}

/// POST /api/admin/logout
pub async fn logout(State(state): State<AppState>, session: AdminSession) -> Json<Success<Done>> {
    state.sessions.logout(&session).await;
    Success::new(Done {})
}

/// GET /api/admin/check-auth
pub async fn check_auth(_session: AdminSession) -> Json<Success<Done>> {
    Success::new(Done {})
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    limit: Option<i64>,
}

/// GET /api/admin/audit?limit={n}
pub async fn list_audit_events(
    State(state): State<AppState>,
    _session: AdminSession,
    Query(params): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditEvent>>> {
    let limit = params.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(AppError::Validation("limit must be between 1 and 1000".to_string()));
    }
    Ok(Json(queries::list_audit_events(&state.pool, limit).await?))
}
