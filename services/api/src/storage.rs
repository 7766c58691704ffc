//! Blob store access for uploaded study materials.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::StorageConfig;

/// A downloaded object and its declared media type.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub media_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<StoredFile>;
}

/// Reads objects over the storage service's REST interface.
pub struct HttpFileStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl HttpFileStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

/// Guesses a media type from the file extension when the store sends none.
pub fn media_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "md" => "text/markdown",
        "json" => "application/json",
        _ => "text/plain",
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<StoredFile> {
        let url = self.object_url(bucket, path);
        debug!(%bucket, %path, "Downloading file");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .context("Failed to reach the file store")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Failed to download file: {} {}", status.as_u16(), body);
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| !value.is_empty() && value != "application/octet-stream")
            .unwrap_or_else(|| media_type_for(path).to_string());
        let data = response.bytes().await?.to_vec();

        Ok(StoredFile { media_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let store = HttpFileStore::new(&StorageConfig {
            url: "https://blobs.example.com/storage/v1/".to_string(),
            service_key: "key".to_string(),
        })
        .unwrap();
        assert_eq!(
            store.object_url("study-materials", "/user/guide.pdf"),
            "https://blobs.example.com/storage/v1/object/study-materials/user/guide.pdf"
        );
    }

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(media_type_for("notes/Chapter1.PDF"), "application/pdf");
        assert_eq!(media_type_for("diagram.jpeg"), "image/jpeg");
        assert_eq!(media_type_for("readme"), "text/plain");
        assert_eq!(media_type_for("summary.md"), "text/markdown");
    }
}
