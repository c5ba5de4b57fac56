use crate::models::{PlanTier, Session, User};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3-32 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 64, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 64, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 7, max = 20, message = "Invalid phone number"))]
    pub phone: Option<String>,
    /// Checked by [`RegisterRequest::validate_all`]; the derive cannot see
    /// through `Secret`.
    pub password: Secret<String>,
    pub address: Option<String>,
}

impl RegisterRequest {
    /// Field rules plus the password length rule, reported together.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let len = self.password.expose_secret().chars().count();
        if !(8..=128).contains(&len) {
            let mut err = ValidationError::new("password_length");
            err.message = Some("Password must be 8-128 characters".into());
            errors.add("password", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Secret<String>,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Profile view of the authenticated user. Never exposes credentials.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: String,
    pub plan: PlanTier,
    pub plan_expiry: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            address: user.address,
            role: user.role,
            plan: user.plan,
            plan_expiry: user.plan_expiry.map(|d| d.to_rfc3339()),
            last_login: user.last_login.map(|d| d.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
    pub expires_at: String,
    pub current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_id: &str) -> Self {
        Self {
            current: session.id == current_id,
            id: session.id,
            ip: session.ip,
            user_agent: session.user_agent,
            created_at: session.created_at.to_rfc3339(),
            last_active_at: session.last_active_at.to_rfc3339(),
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}
