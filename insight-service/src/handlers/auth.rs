use crate::dtos::{
    AvailabilityQuery, AvailabilityResponse, LoginRequest, MessageResponse, ProfileResponse,
    RegisterRequest, RegisterResponse,
};
use crate::middleware::{session_token, CurrentUser};
use crate::services::ClientMeta;
use crate::startup::AppState;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;
use service_core::middleware::client_ip;
use std::net::SocketAddr;

fn client_meta(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> ClientMeta {
    let ip = client_ip(headers, Some(peer.ip()), trust_forwarded_for).map(|ip| ip.to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientMeta { ip, user_agent }
}

pub async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let available = state.auth.check_availability(&query).await?;
    Ok(Json(AvailabilityResponse { available }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user_id: user.id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let remember = request.remember;
    let outcome = state
        .auth
        .login(
            request,
            client_meta(&headers, peer, state.config.server.trust_forwarded_for),
        )
        .await?;

    let mut cookie = Cookie::build((state.auth.cookie_name().to_string(), outcome.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.auth.secure_cookie());
    if remember {
        let seconds = (outcome.session.expires_at - outcome.session.created_at).num_seconds();
        cookie = cookie.max_age(time::Duration::seconds(seconds));
    }

    Ok((jar.add(cookie.build()), Json(ProfileResponse::from(outcome.user))))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token(&headers, state.auth.cookie_name()) {
        state.auth.logout(&token).await?;
    }

    let removal = Cookie::build((state.auth.cookie_name().to_string(), "")).path("/");
    Ok((
        jar.remove(removal),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

pub async fn me(CurrentUser(ctx): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from(ctx.user))
}
