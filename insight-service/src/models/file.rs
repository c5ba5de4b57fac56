use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `pending -> processing -> completed | failed`; a failed (or stale
/// processing) file may be moved back to `processing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Opaque payload returned by the analytics engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResults {
    pub forecast: serde_json::Value,
    pub pricing: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub remote_url: String,
    pub remote_id: String,
    pub size: i64,
    pub format: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_results: Option<AnalysisResults>,
    /// Fencing token of the run currently allowed to finish this file.
    pub analysis_run_id: Option<String>,
    #[serde(default, with = "crate::models::datetime")]
    pub analysis_started_at: Option<DateTime<Utc>>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        owner_id: String,
        original_name: String,
        remote_url: String,
        remote_id: String,
        size: i64,
        format: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            original_name,
            remote_url,
            remote_id,
            size,
            format,
            analysis_status: AnalysisStatus::Pending,
            analysis_results: None,
            analysis_run_id: None,
            analysis_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a new analysis run may claim this file at `now`.
    pub fn can_begin_analysis(&self, stale_before: DateTime<Utc>) -> bool {
        match self.analysis_status {
            AnalysisStatus::Processing => self
                .analysis_started_at
                .map(|started| started < stale_before)
                .unwrap_or(true),
            _ => true,
        }
    }
}
