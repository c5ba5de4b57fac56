use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entitlement tier carried on the user record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Maps a catalog plan name ("Pro", "enterprise") onto a tier.
    pub fn from_plan_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry. Reference data; the core flows never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Price in minor currency units (paise for INR).
    pub price_minor: i64,
    pub currency: String,
    pub billing_cycle: String,
    pub features: Vec<String>,
    pub is_active: bool,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(name: &str, price_minor: i64, currency: &str, features: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price_minor,
            currency: currency.to_string(),
            billing_cycle: "monthly".to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn tier(&self) -> Option<PlanTier> {
        PlanTier::from_plan_name(&self.name)
    }

    /// Catalog inserted on first start when the plan collection is empty.
    pub fn default_catalog(currency: &str) -> Vec<Plan> {
        vec![
            Plan::new(
                "Pro",
                49_900,
                currency,
                &[
                    "10 CSV uploads per billing cycle",
                    "Sales forecasting",
                    "Legacy and modern pricing suggestions",
                ],
            ),
            Plan::new(
                "Enterprise",
                199_900,
                currency,
                &[
                    "Sales forecasting",
                    "Legacy and modern pricing suggestions",
                    "Priority support",
                ],
            ),
        ]
    }
}
