use crate::models::{AnalysisResults, AnalysisStatus, FileRecord};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub original_name: String,
    pub remote_url: String,
    pub size: i64,
    pub format: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_results: Option<AnalysisResults>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name,
            remote_url: file.remote_url,
            size: file.size,
            format: file.format,
            analysis_status: file.analysis_status,
            analysis_results: file.analysis_results,
            created_at: file.created_at.to_rfc3339(),
            updated_at: file.updated_at.to_rfc3339(),
        }
    }
}

/// `{forecast, pricing: {legacy, modern}}` as produced by the engine.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub file_id: String,
    pub forecast: serde_json::Value,
    pub pricing: serde_json::Value,
}

impl AnalysisResponse {
    pub fn new(file_id: String, results: AnalysisResults) -> Self {
        Self {
            file_id,
            forecast: results.forecast,
            pricing: results.pricing,
        }
    }
}
