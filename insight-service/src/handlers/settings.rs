use crate::dtos::{MessageResponse, SessionResponse};
use crate::middleware::CurrentUser;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

/// Active sessions of the caller, the current one flagged.
pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.auth.list_sessions(&ctx.user.id).await?;
    let response: Vec<SessionResponse> = sessions
        .into_iter()
        .map(|s| SessionResponse::from_session(s, &ctx.session_id))
        .collect();
    Ok(Json(response))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .revoke_session(&ctx.user.id, &session_id)
        .await?;
    Ok(Json(MessageResponse::new("Session revoked")))
}
