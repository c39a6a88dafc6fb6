use crate::utils::{ApiError, ApiResult, Config};
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;

/// Image extensions accepted for uploads
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub backend: &'static str,
}

/// Azure Blob storage through a container SAS URL; local `uploads/` otherwise
pub struct StorageService {
    http: reqwest::Client,
    container_sas_url: Option<String>,
    local_dir: PathBuf,
    public_base_url: String,
}

impl StorageService {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            container_sas_url: config.upload.azure_container_sas_url.clone(),
            local_dir: PathBuf::from(&config.upload.local_dir),
            public_base_url: config.server.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn uses_blob_storage(&self) -> bool {
        self.container_sas_url.is_some()
    }

    pub fn local_dir(&self) -> &PathBuf {
        &self.local_dir
    }

    /// Store `content` as `{folder}/{name}`; a failed blob upload falls back to disk
    pub async fn store(
        &self,
        folder: &str,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> ApiResult<StoredFile> {
        if let Some(sas_url) = &self.container_sas_url {
            match self.put_blob(sas_url, folder, name, content_type, content.clone()).await {
                Ok(url) => return Ok(StoredFile { url, backend: "azure_blob" }),
                Err(e) => tracing::warn!("Blob upload failed, storing locally: {}", e),
            }
        }
        self.store_local(folder, name, content).await
    }

    async fn put_blob(
        &self,
        sas_url: &str,
        folder: &str,
        name: &str,
        content_type: &str,
        content: Bytes,
    ) -> ApiResult<String> {
        let (container, query) = sas_url.split_once('?').unwrap_or((sas_url, ""));
        let blob_url = format!("{}/{}/{}", container.trim_end_matches('/'), folder, name);
        let upload_url = if query.is_empty() {
            blob_url.clone()
        } else {
            format!("{}?{}", blob_url, query)
        };

        let response = self
            .http
            .put(&upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .body(content)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::service_unavailable(format!(
                "Blob storage returned {}",
                response.status()
            )));
        }
        Ok(blob_url)
    }

    async fn store_local(&self, folder: &str, name: &str, content: Bytes) -> ApiResult<StoredFile> {
        let dir = self.local_dir.join(folder);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            tracing::error!("Failed to create upload dir {}: {}", dir.display(), e);
            ApiError::internal_error("Failed to store file")
        })?;
        tokio::fs::write(dir.join(name), &content).await.map_err(|e| {
            tracing::error!("Failed to write upload {}: {}", name, e);
            ApiError::internal_error("Failed to store file")
        })?;

        Ok(StoredFile {
            url: format!("{}/uploads/{}/{}", self.public_base_url, folder, name),
            backend: "local",
        })
    }
}

/// Lowercased extension when it is an accepted image type
pub fn image_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}
