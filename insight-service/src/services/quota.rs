//! Upload quota policy. Pure: callers supply the clock and the file count.

use crate::config::QuotaConfig;
use crate::error::InsightError;
use crate::models::{PlanTier, User};
use chrono::{DateTime, Datelike, Months, TimeZone, Utc};

/// The counting window and allowance that apply to one user at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaWindow {
    pub tier: PlanTier,
    pub start: DateTime<Utc>,
    pub limit: u64,
}

impl QuotaWindow {
    /// Admits one more upload when fewer than `limit` files were created
    /// since `start`.
    pub fn admit(&self, files_in_window: u64) -> Result<(), InsightError> {
        if files_in_window >= self.limit {
            return Err(InsightError::QuotaExceeded {
                limit: self.limit,
                tier: self.tier,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    free_limit: u64,
    pro_limit: u64,
}

impl QuotaPolicy {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            free_limit: config.free_limit,
            pro_limit: config.pro_limit,
        }
    }

    pub fn limit_for(&self, tier: PlanTier) -> u64 {
        match tier {
            PlanTier::Pro => self.pro_limit,
            PlanTier::Free | PlanTier::Enterprise => self.free_limit,
        }
    }

    /// Pro windows start one calendar month before `plan_expiry`; every
    /// other tier counts from the first instant of the current UTC month.
    pub fn window_start(
        tier: PlanTier,
        plan_expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, InsightError> {
        match tier {
            PlanTier::Pro => {
                let expiry = plan_expiry.ok_or_else(|| {
                    InsightError::Configuration("pro plan has no expiry date".to_string())
                })?;
                expiry.checked_sub_months(Months::new(1)).ok_or_else(|| {
                    InsightError::Configuration(format!("plan expiry {} out of range", expiry))
                })
            }
            PlanTier::Free | PlanTier::Enterprise => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .ok_or_else(|| {
                    InsightError::Configuration(format!("cannot compute month start for {}", now))
                }),
        }
    }

    pub fn window_for(&self, user: &User, now: DateTime<Utc>) -> Result<QuotaWindow, InsightError> {
        Ok(QuotaWindow {
            tier: user.plan,
            start: Self::window_start(user.plan, user.plan_expiry, now)?,
            limit: self.limit_for(user.plan),
        })
    }
}
