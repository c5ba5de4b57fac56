use super::plan::PlanTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry in a user's bounded login history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRecord {
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: String,
    pub role: String,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default, with = "crate::models::datetime")]
    pub plan_expiry: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub invoice_ids: Vec<String>,
    #[serde(default)]
    pub failed_login_attempts: u32,
    #[serde(default, with = "crate::models::datetime")]
    pub lock_until: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::datetime")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub login_history: Vec<LoginRecord>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            username: None,
            first_name,
            last_name,
            email,
            phone: None,
            address: None,
            password_hash,
            role: "user".to_string(),
            plan: PlanTier::Free,
            plan_expiry: None,
            subscription_id: None,
            payment_method: None,
            invoice_ids: Vec::new(),
            failed_login_attempts: 0,
            lock_until: None,
            last_login: None,
            login_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining lock time, if the account is locked at `now`.
    pub fn locked_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.lock_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn plan_is_active(&self, now: DateTime<Utc>) -> bool {
        self.plan_expiry.map(|expiry| expiry > now).unwrap_or(false)
    }
}

/// Entitlement change applied together with an invoice insert.
#[derive(Debug, Clone)]
pub struct PlanActivation {
    pub user_id: String,
    pub plan: PlanTier,
    pub plan_expiry: DateTime<Utc>,
    pub subscription_id: String,
    pub payment_method: String,
}
