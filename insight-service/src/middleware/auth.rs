use crate::error::InsightError;
use crate::services::AuthContext;
use crate::startup::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

/// Session token carried by the request cookie, if any.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Extractor that requires a live session cookie.
pub struct CurrentUser(pub AuthContext);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, state.auth.cookie_name())
            .ok_or(InsightError::Unauthenticated)?;

        let ctx = state.auth.authenticate(&token).await?;
        tracing::Span::current().record("user_id", tracing::field::display(&ctx.user.id));

        Ok(CurrentUser(ctx))
    }
}
