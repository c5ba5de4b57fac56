//! Registration, login with lockout, and server-side sessions.

use super::password::{hash_password_blocking, verify_password_blocking};
use crate::config::SessionConfig;
use crate::dtos::{AvailabilityQuery, LoginRequest, RegisterRequest};
use crate::error::InsightError;
use crate::models::{LoginRecord, Session, User};
use crate::repository::{IdentityField, RepoError, Store};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Consecutive failures that lock an account.
pub const MAX_FAILED_LOGINS: u32 = 5;
pub const LOCKOUT_MINUTES: i64 = 30;

/// Identity resolved for one request: the live session and the user record
/// as currently stored, never a snapshot from login time.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session_id: String,
}

/// Connection details recorded with a login.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub struct LoginOutcome {
    /// Opaque cookie value. Only its digest is persisted.
    pub token: String,
    pub session: Session,
    pub user: User,
}

impl std::fmt::Debug for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOutcome")
            .field("token", &"[REDACTED]")
            .field("session", &self.session)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    config: SessionConfig,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    pub fn secure_cookie(&self) -> bool {
        self.config.secure_cookie
    }

    fn session_ttl(&self, remember: bool) -> Duration {
        if remember {
            Duration::days(self.config.remember_ttl_days)
        } else {
            Duration::hours(self.config.ttl_hours)
        }
    }

    /// `true` when none of the supplied identity values is taken.
    pub async fn check_availability(&self, query: &AvailabilityQuery) -> Result<bool, InsightError> {
        let candidates = [
            (IdentityField::Username, non_empty(query.username.as_deref())),
            (
                IdentityField::Email,
                non_empty(query.email.as_deref()).map(|e| normalize_email(&e)),
            ),
            (IdentityField::Phone, non_empty(query.phone.as_deref())),
        ];

        if candidates.iter().all(|(_, v)| v.is_none()) {
            return Err(InsightError::BadRequest(
                "Provide a username, email or phone to check".to_string(),
            ));
        }

        for (field, value) in candidates {
            if let Some(value) = value {
                if self.store.identity_in_use(field, &value).await? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, InsightError> {
        request.validate_all()?;

        let email = normalize_email(&request.email);
        let username = non_empty(request.username.as_deref());
        let phone = non_empty(request.phone.as_deref());

        let identities = [
            (IdentityField::Username, username.as_deref()),
            (IdentityField::Email, Some(email.as_str())),
            (IdentityField::Phone, phone.as_deref()),
        ];
        for (field, value) in identities {
            if let Some(value) = value {
                if self.store.identity_in_use(field, value).await? {
                    return Err(InsightError::Conflict(format!(
                        "{} already in use.",
                        field.as_str()
                    )));
                }
            }
        }

        let password_hash = hash_password_blocking(request.password).await?;

        let mut user = User::new(
            request.first_name.trim().to_string(),
            request.last_name.trim().to_string(),
            email,
            password_hash,
        );
        user.username = username;
        user.phone = phone;
        user.address = non_empty(request.address.as_deref());

        match self.store.insert_user(user.clone()).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "User registered");
                Ok(user)
            }
            Err(RepoError::Duplicate(_)) => Err(InsightError::Conflict(
                "An account with these details already exists.".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        meta: ClientMeta,
    ) -> Result<LoginOutcome, InsightError> {
        let now = Utc::now();
        let email = normalize_email(&request.email);

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(InsightError::InvalidCredentials)?;

        if let Some(remaining) = user.locked_for(now) {
            let minutes = (remaining.num_seconds() + 59) / 60;
            tracing::warn!(user_id = %user.id, minutes, "Login attempt on locked account");
            return Err(InsightError::AccountLocked { minutes });
        }

        let matches = verify_password_blocking(request.password, user.password_hash.clone()).await?;
        if !matches {
            self.store
                .record_login_failure(
                    &user.id,
                    MAX_FAILED_LOGINS,
                    now + Duration::minutes(LOCKOUT_MINUTES),
                )
                .await?;
            tracing::warn!(user_id = %user.id, "Failed login");
            return Err(InsightError::InvalidCredentials);
        }

        self.store
            .record_login_success(
                &user.id,
                LoginRecord {
                    at: now,
                    ip: meta.ip.clone(),
                    user_agent: meta.user_agent.clone(),
                },
            )
            .await?;

        let token = new_token();
        let session = Session::new(
            token_digest(&token),
            user.id.clone(),
            meta.ip,
            meta.user_agent,
            now + self.session_ttl(request.remember),
        );
        self.store.insert_session(session.clone()).await?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "User logged in");
        Ok(LoginOutcome {
            token,
            session,
            user,
        })
    }

    /// Resolves a cookie token to a live session and the current user record.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, InsightError> {
        let now = Utc::now();
        let session = self
            .store
            .find_session(&token_digest(token), now)
            .await?
            .ok_or(InsightError::Unauthenticated)?;

        let user = self
            .store
            .find_user(&session.user_id)
            .await?
            .ok_or(InsightError::Unauthenticated)?;

        self.store.touch_session(&session.id, now).await?;

        Ok(AuthContext {
            user,
            session_id: session.id,
        })
    }

    /// Ends the session behind `token`. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), InsightError> {
        if let Some(session) = self
            .store
            .find_session(&token_digest(token), Utc::now())
            .await?
        {
            self.store
                .delete_session(&session.user_id, &session.id)
                .await?;
            tracing::info!(user_id = %session.user_id, session_id = %session.id, "User logged out");
        }
        Ok(())
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, InsightError> {
        Ok(self.store.list_sessions(user_id, Utc::now()).await?)
    }

    pub async fn revoke_session(&self, user_id: &str, session_id: &str) -> Result<(), InsightError> {
        if !self.store.delete_session(user_id, session_id).await? {
            return Err(InsightError::NotFound("Session"));
        }
        tracing::info!(user_id = %user_id, session_id = %session_id, "Session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use secrecy::Secret;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryStore::new()), SessionConfig::default())
    }

    fn register_request(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: email.into(),
            phone: None,
            password: Secret::new("correct horse".into()),
            address: None,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: Secret::new(password.into()),
            remember: false,
        }
    }

    #[tokio::test]
    async fn register_then_authenticate_with_token() {
        let auth = service();
        let user = auth
            .register(register_request("Asha@Example.com ", "asha"))
            .await
            .unwrap();
        assert_eq!(user.email, "asha@example.com");

        let outcome = auth
            .login(login_request("asha@example.com", "correct horse"), ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(outcome.token.len(), 64);
        assert_ne!(outcome.session.token_hash, outcome.token);

        let ctx = auth.authenticate(&outcome.token).await.unwrap();
        assert_eq!(ctx.user.id, user.id);
        assert_eq!(ctx.session_id, outcome.session.id);

        auth.logout(&outcome.token).await.unwrap();
        assert!(matches!(
            auth.authenticate(&outcome.token).await,
            Err(InsightError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn duplicate_username_is_reported_by_field() {
        let auth = service();
        auth.register(register_request("a@example.com", "asha"))
            .await
            .unwrap();
        let err = auth
            .register(register_request("b@example.com", "asha"))
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Conflict(msg) if msg == "username already in use."));
    }

    #[tokio::test]
    async fn account_locks_after_repeated_failures() {
        let auth = service();
        auth.register(register_request("a@example.com", "asha"))
            .await
            .unwrap();

        for _ in 0..MAX_FAILED_LOGINS {
            let err = auth
                .login(login_request("a@example.com", "wrong"), ClientMeta::default())
                .await
                .unwrap_err();
            assert!(matches!(err, InsightError::InvalidCredentials));
        }

        let err = auth
            .login(login_request("a@example.com", "correct horse"), ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::AccountLocked { minutes } if minutes == LOCKOUT_MINUTES));
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_anything_is_stored() {
        let auth = service();
        let mut request = register_request("a@example.com", "asha");
        request.password = Secret::new("short".into());

        let err = auth.register(request).await.unwrap_err();
        assert!(matches!(err, InsightError::Validation(ref e) if e.field_errors().contains_key("password")));

        let available = auth
            .check_availability(&AvailabilityQuery {
                username: None,
                email: Some("a@example.com".into()),
                phone: None,
            })
            .await
            .unwrap();
        assert!(available);
    }

    #[tokio::test]
    async fn login_outcome_debug_hides_token() {
        let auth = service();
        auth.register(register_request("a@example.com", "asha"))
            .await
            .unwrap();
        let outcome = auth
            .login(login_request("a@example.com", "correct horse"), ClientMeta::default())
            .await
            .unwrap();

        let rendered = format!("{:?}", outcome);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(&outcome.token));
    }

    #[tokio::test]
    async fn availability_requires_a_field() {
        let auth = service();
        let empty = AvailabilityQuery {
            username: None,
            email: Some("  ".into()),
            phone: None,
        };
        assert!(matches!(
            auth.check_availability(&empty).await,
            Err(InsightError::BadRequest(_))
        ));
    }
}
