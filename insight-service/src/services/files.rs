//! Upload orchestration: quota check, blob upload, record insert.

use super::metrics::record_upload;
use super::quota::QuotaPolicy;
use super::storage::BlobStore;
use crate::error::InsightError;
use crate::models::{FileRecord, User};
use crate::repository::Store;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Folder under which uploaded CSVs are stored on the blob host.
pub const BLOB_FOLDER: &str = "sales_data";

#[derive(Debug)]
pub struct UploadedFile {
    pub original_name: String,
    pub data: Vec<u8>,
}

/// Loads a file and checks that `owner_id` owns it.
pub(crate) async fn load_owned_file(
    store: &dyn Store,
    owner_id: &str,
    file_id: &str,
) -> Result<FileRecord, InsightError> {
    let file = store
        .find_file(file_id)
        .await?
        .ok_or(InsightError::NotFound("File"))?;
    if file.owner_id != owner_id {
        tracing::warn!(file_id = %file_id, user_id = %owner_id, "File access by non-owner");
        return Err(InsightError::Forbidden("Not authorized to access this file"));
    }
    Ok(file)
}

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    policy: QuotaPolicy,
    /// Serializes quota check and insert per user.
    upload_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FileService {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, policy: QuotaPolicy) -> Self {
        Self {
            store,
            blobs,
            policy,
            upload_locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn upload(&self, user: &User, file: UploadedFile) -> Result<FileRecord, InsightError> {
        let lock = self
            .upload_locks
            .entry(user.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.upload_serialized(user, file).await
        };

        drop(lock);
        self.upload_locks
            .remove_if(&user.id, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn upload_serialized(
        &self,
        user: &User,
        file: UploadedFile,
    ) -> Result<FileRecord, InsightError> {
        let window = self.policy.window_for(user, Utc::now())?;
        let used = self.store.count_files_since(&user.id, window.start).await?;

        if let Err(e) = window.admit(used) {
            record_upload("quota_exceeded");
            tracing::info!(
                user_id = %user.id,
                plan = %window.tier,
                used,
                limit = window.limit,
                "Upload rejected by quota"
            );
            return Err(e);
        }

        let public_id = format!("{}/{}", BLOB_FOLDER, Uuid::new_v4());
        let blob = self
            .blobs
            .upload(&public_id, file.data)
            .await
            .map_err(|e| {
                record_upload("blob_failed");
                InsightError::UpstreamUnavailable(e.to_string())
            })?;

        let record = FileRecord::new(
            user.id.clone(),
            file.original_name,
            blob.url,
            blob.id,
            blob.size,
            blob.format,
        );

        if let Err(e) = self.store.insert_file(record.clone()).await {
            record_upload("insert_failed");
            if let Err(cleanup) = self.blobs.delete(&record.remote_id).await {
                tracing::error!(
                    remote_id = %record.remote_id,
                    error = %cleanup,
                    "Orphaned blob left after failed file insert"
                );
            }
            return Err(e.into());
        }

        record_upload("accepted");
        tracing::info!(
            user_id = %user.id,
            file_id = %record.id,
            size = record.size,
            "File uploaded"
        );
        Ok(record)
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<FileRecord>, InsightError> {
        Ok(self.store.list_files(owner_id).await?)
    }

    /// Raw CSV text of an owned file.
    pub async fn content(&self, owner_id: &str, file_id: &str) -> Result<String, InsightError> {
        let file = load_owned_file(self.store.as_ref(), owner_id, file_id).await?;
        let bytes = self
            .blobs
            .fetch(&file.remote_id, &file.remote_url)
            .await
            .map_err(|e| InsightError::UpstreamUnavailable(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Removes the record, then the blob. A blob failure is only logged.
    pub async fn delete(&self, owner_id: &str, file_id: &str) -> Result<(), InsightError> {
        let file = load_owned_file(self.store.as_ref(), owner_id, file_id).await?;
        if !self.store.delete_file(owner_id, file_id).await? {
            return Err(InsightError::NotFound("File"));
        }

        if let Err(e) = self.blobs.delete(&file.remote_id).await {
            tracing::error!(file_id = %file_id, remote_id = %file.remote_id, error = %e, "Failed to delete blob");
        }
        tracing::info!(user_id = %owner_id, file_id = %file_id, "File deleted");
        Ok(())
    }
}
