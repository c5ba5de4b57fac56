//! Single-flight analysis runs against the analytics engine.

use super::analytics::AnalyticsClient;
use super::files::load_owned_file;
use super::metrics::record_analysis;
use crate::error::InsightError;
use crate::models::AnalysisResults;
use crate::repository::{AnalysisOutcome, Store};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn Store>,
    analytics: AnalyticsClient,
    /// A `processing` claim older than this may be taken over.
    stale_after: Duration,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn Store>, analytics: AnalyticsClient, stale_after: Duration) -> Self {
        Self {
            store,
            analytics,
            stale_after,
        }
    }

    /// Claims the file, calls forecast and pricing concurrently and
    /// persists the combined outcome under the claim's run id.
    pub async fn analyze(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<AnalysisResults, InsightError> {
        load_owned_file(self.store.as_ref(), owner_id, file_id).await?;

        let now = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let file = self
            .store
            .try_begin_analysis(owner_id, file_id, &run_id, now, now - self.stale_after)
            .await?
            .ok_or_else(|| {
                record_analysis("in_progress");
                InsightError::AnalysisInProgress
            })?;

        tracing::info!(file_id = %file_id, run_id = %run_id, "Analysis started");

        let outcome = tokio::try_join!(
            self.analytics.forecast(&file.remote_url),
            self.analytics.pricing(&file.remote_url)
        );

        match outcome {
            Ok((forecast, pricing)) => {
                let results = AnalysisResults { forecast, pricing };
                if let Err(e) = self
                    .store
                    .finish_analysis(
                        file_id,
                        &run_id,
                        AnalysisOutcome::Completed(results.clone()),
                        Utc::now(),
                    )
                    .await
                {
                    tracing::error!(file_id = %file_id, run_id = %run_id, error = %e, "Failed to persist analysis results");
                    self.settle_failed(file_id, &run_id).await;
                    record_analysis("failed");
                    return Err(e.into());
                }

                record_analysis("completed");
                tracing::info!(file_id = %file_id, run_id = %run_id, "Analysis completed");
                Ok(results)
            }
            Err(e) => {
                tracing::error!(file_id = %file_id, run_id = %run_id, error = %e, "Analytics engine call failed");
                self.settle_failed(file_id, &run_id).await;
                record_analysis("failed");
                Err(InsightError::AnalysisFailed)
            }
        }
    }

    async fn settle_failed(&self, file_id: &str, run_id: &str) {
        match self
            .store
            .finish_analysis(file_id, run_id, AnalysisOutcome::Failed, Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(file_id = %file_id, run_id = %run_id, "Run superseded before it could be marked failed")
            }
            Err(e) => {
                tracing::error!(file_id = %file_id, run_id = %run_id, error = %e, "Failed to mark analysis as failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::models::{AnalysisStatus, FileRecord};
    use crate::repository::{FileRepository, MemoryStore};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fixture(server: &MockServer) -> (AnalysisService, Arc<MemoryStore>, FileRecord) {
        let store = Arc::new(MemoryStore::new());
        let analytics = AnalyticsClient::new(&AnalyticsConfig {
            base_url: server.uri(),
            ..AnalyticsConfig::default()
        })
        .unwrap();
        let file = FileRecord::new(
            "owner".into(),
            "sales.csv".into(),
            "http://blobs/sales.csv".into(),
            "sales_data/1".into(),
            10,
            "csv".into(),
        );
        store.insert_file(file.clone()).await.unwrap();
        (
            AnalysisService::new(store.clone(), analytics, Duration::minutes(5)),
            store,
            file,
        )
    }

    #[tokio::test]
    async fn completed_run_stores_both_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"next": [1, 2]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": 99})))
            .mount(&server)
            .await;

        let (service, store, file) = fixture(&server).await;
        let results = service.analyze("owner", &file.id).await.unwrap();
        assert_eq!(results.pricing["price"], 99);

        let stored = store.find_file(&file.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis_status, AnalysisStatus::Completed);
        assert_eq!(stored.analysis_results, Some(results));
    }

    #[tokio::test]
    async fn engine_failure_marks_file_failed_and_allows_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let (service, store, file) = fixture(&server).await;
        let err = service.analyze("owner", &file.id).await.unwrap_err();
        assert!(matches!(err, InsightError::AnalysisFailed));

        let stored = store.find_file(&file.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis_status, AnalysisStatus::Failed);
        assert!(stored.analysis_results.is_none());

        let err = service.analyze("owner", &file.id).await.unwrap_err();
        assert!(matches!(err, InsightError::AnalysisFailed));
    }

    #[tokio::test]
    async fn fresh_processing_claim_rejects_second_run() {
        let server = MockServer::start().await;
        let (service, store, file) = fixture(&server).await;
        let now = Utc::now();
        store
            .try_begin_analysis("owner", &file.id, "other-run", now, now - Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();

        let err = service.analyze("owner", &file.id).await.unwrap_err();
        assert!(matches!(err, InsightError::AnalysisInProgress));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let server = MockServer::start().await;
        let (service, _store, file) = fixture(&server).await;
        assert!(matches!(
            service.analyze("intruder", &file.id).await,
            Err(InsightError::Forbidden(_))
        ));
    }
}
