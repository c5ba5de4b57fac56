//! Blob host for uploaded CSV files: local disk for development and tests,
//! Cloudinary raw uploads in production.

use crate::config::CloudinaryConfig;
use async_trait::async_trait;
use reqwest::{multipart, Client};
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const CSV_FORMAT: &str = "csv";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob host rejected request: {0}")]
    Rejected(String),

    #[error("invalid blob id: {0}")]
    InvalidId(String),
}

/// Durable location of an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    pub id: String,
    pub size: i64,
    pub format: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, public_id: &str, data: Vec<u8>) -> Result<StoredBlob, StorageError>;
    async fn fetch(&self, public_id: &str, url: &str) -> Result<Vec<u8>, StorageError>;
    async fn delete(&self, public_id: &str) -> Result<(), StorageError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, public_id: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(public_id);
        if public_id.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidId(public_id.to_string()));
        }
        Ok(self
            .base_path
            .join(format!("{}.{}", public_id, CSV_FORMAT)))
    }
}

#[async_trait]
impl BlobStore for LocalStorage {
    async fn upload(&self, public_id: &str, data: Vec<u8>) -> Result<StoredBlob, StorageError> {
        let path = self.path_for(public_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let size = data.len() as i64;
        fs::write(&path, data).await?;

        Ok(StoredBlob {
            url: format!("{}/{}.{}", self.public_base_url, public_id, CSV_FORMAT),
            id: public_id.to_string(),
            size,
            format: CSV_FORMAT.to_string(),
        })
    }

    async fn fetch(&self, public_id: &str, _url: &str) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.path_for(public_id)?).await?)
    }

    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(public_id)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryUpload {
    public_id: String,
    secure_url: String,
    bytes: i64,
}

#[derive(Debug, Deserialize)]
struct CloudinaryDestroy {
    result: String,
}

/// Cloudinary `raw` resource client using signed uploads.
pub struct CloudinaryStorage {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryStorage {
    pub fn new(client: Client, config: CloudinaryConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/raw/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.cloud_name,
            action
        )
    }

    /// SHA-256 request signature: the signed parameters sorted by name,
    /// joined as `k=v&k=v`, followed by the API secret.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn rejected(response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::Rejected(format!("{}: {}", status, body))
    }
}

#[async_trait]
impl BlobStore for CloudinaryStorage {
    async fn upload(&self, public_id: &str, data: Vec<u8>) -> Result<StoredBlob, StorageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("format", CSV_FORMAT),
            ("public_id", public_id),
            ("timestamp", &timestamp),
        ]);

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(data).file_name(format!("{}.{}", public_id, CSV_FORMAT)),
            )
            .text("api_key", self.config.api_key.clone())
            .text("format", CSV_FORMAT)
            .text("public_id", public_id.to_string())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let uploaded: CloudinaryUpload = response.json().await?;
        tracing::info!(public_id = %uploaded.public_id, bytes = uploaded.bytes, "Blob uploaded");

        Ok(StoredBlob {
            url: uploaded.secure_url,
            id: uploaded.public_id,
            size: uploaded.bytes,
            format: CSV_FORMAT.to_string(),
        })
    }

    async fn fetch(&self, _public_id: &str, url: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("api_key", self.config.api_key.as_str()),
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let destroyed: CloudinaryDestroy = response.json().await?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(StorageError::Rejected(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cloudinary(base: &str) -> CloudinaryStorage {
        CloudinaryStorage::new(
            Client::new(),
            CloudinaryConfig {
                cloud_name: "demo".into(),
                api_key: "key".into(),
                api_secret: Secret::new("abcd".into()),
                api_base_url: base.into(),
            },
        )
    }

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let storage = cloudinary("http://unused");
        let signature = storage.sign(&[("timestamp", "1"), ("public_id", "a")]);
        let expected = hex::encode(Sha256::digest(b"public_id=a&timestamp=1abcd"));
        assert_eq!(signature, expected);
    }

    #[tokio::test]
    async fn local_round_trip_and_delete() {
        let dir = format!("target/test-blobs-{}", Uuid::new_v4());
        let storage = LocalStorage::new(&dir, "http://files.local/").await.unwrap();

        let blob = storage
            .upload("sales_data/abc", b"month,units\n1,10\n".to_vec())
            .await
            .unwrap();
        assert_eq!(blob.url, "http://files.local/sales_data/abc.csv");
        assert_eq!(blob.size, 17);
        assert_eq!(blob.format, "csv");

        let bytes = storage.fetch(&blob.id, &blob.url).await.unwrap();
        assert_eq!(bytes, b"month,units\n1,10\n");

        storage.delete(&blob.id).await.unwrap();
        assert!(storage.fetch(&blob.id, &blob.url).await.is_err());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn local_rejects_traversal() {
        let dir = format!("target/test-blobs-{}", Uuid::new_v4());
        let storage = LocalStorage::new(&dir, "http://files.local").await.unwrap();
        let err = storage.upload("../escape", vec![1]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn cloudinary_upload_uses_signed_raw_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/raw/upload"))
            .and(body_string_contains("sales_data/xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "public_id": "sales_data/xyz",
                "secure_url": "https://res.cloudinary.com/demo/raw/upload/sales_data/xyz.csv",
                "bytes": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let blob = cloudinary(&server.uri())
            .upload("sales_data/xyz", b"a,b\n1".to_vec())
            .await
            .unwrap();
        assert_eq!(blob.id, "sales_data/xyz");
        assert_eq!(blob.size, 5);
        assert!(blob.url.ends_with("xyz.csv"));
    }

    #[tokio::test]
    async fn cloudinary_upload_failure_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/raw/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
            .mount(&server)
            .await;

        let err = cloudinary(&server.uri())
            .upload("sales_data/xyz", vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected(msg) if msg.contains("401")));
    }
}
