//! HTTP client for the hosted object-storage backend.
//!
//! Speaks an ImageKit-style REST API: multipart upload into a folder,
//! listing by tag, and per-file deletion. The application only sees the
//! [`MediaStore`] trait; everything vendor-shaped stays in here.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::application::media::{MediaError, MediaFolder, MediaStore, StoredAsset};
use crate::infra::error::InfraError;

pub struct HttpMediaStore {
    http: reqwest::Client,
    endpoint: String,
    private_key: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "fileId")]
    file_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(rename = "fileId")]
    file_id: String,
}

impl HttpMediaStore {
    pub fn from_settings(media: &crate::config::MediaSettings) -> Result<Self, InfraError> {
        let endpoint = media
            .endpoint
            .as_deref()
            .ok_or_else(|| InfraError::configuration("media.endpoint must be set"))?;
        let private_key = media
            .private_key
            .as_deref()
            .ok_or_else(|| InfraError::configuration("media.private_key must be set"))?;
        Ok(Self::new(endpoint, private_key))
    }

    pub fn new(endpoint: &str, private_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            private_key: private_key.to_string(),
        }
    }

    fn backend(err: reqwest::Error) -> MediaError {
        MediaError::Backend(Box::new(err))
    }

    async fn list_by_tag(
        &self,
        folder: MediaFolder,
        tag: &str,
    ) -> Result<Vec<FileEntry>, MediaError> {
        let response = self
            .http
            .get(format!("{}/v1/files", self.endpoint))
            .basic_auth(&self.private_key, Some(""))
            .query(&[
                ("tags", tag),
                ("path", folder.as_str()),
            ])
            .send()
            .await
            .map_err(Self::backend)?
            .error_for_status()
            .map_err(Self::backend)?;

        response.json().await.map_err(Self::backend)
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::backend)?
            .error_for_status()
            .map_err(Self::backend)?;

        let bytes = response.bytes().await.map_err(Self::backend)?;
        if bytes.is_empty() {
            return Err(MediaError::BadResponse {
                detail: format!("empty object at {url}"),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        folder: MediaFolder,
        file_name: &str,
        bytes: Vec<u8>,
        tag: &str,
    ) -> Result<StoredAsset, MediaError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(
                mime_guess::from_path(file_name)
                    .first_or_octet_stream()
                    .as_ref(),
            )
            .map_err(Self::backend)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("fileName", file_name.to_string())
            .text("folder", format!("/{}", folder.as_str()))
            .text("tags", tag.to_string());

        let response = self
            .http
            .post(format!("{}/v1/files/upload", self.endpoint))
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(Self::backend)?
            .error_for_status()
            .map_err(Self::backend)?;

        let uploaded: UploadResponse = response.json().await.map_err(Self::backend)?;
        debug!(
            target: "stampino::media",
            folder = folder.as_str(),
            file_name,
            asset_id = %uploaded.file_id,
            "object uploaded"
        );
        Ok(StoredAsset {
            asset_id: uploaded.file_id,
            url: uploaded.url,
        })
    }

    async fn delete_by_tag(&self, folder: MediaFolder, tag: &str) -> Result<u64, MediaError> {
        let entries = self.list_by_tag(folder, tag).await?;
        let mut deleted = 0u64;
        for entry in entries {
            self.http
                .delete(format!("{}/v1/files/{}", self.endpoint, entry.file_id))
                .basic_auth(&self.private_key, Some(""))
                .send()
                .await
                .map_err(Self::backend)?
                .error_for_status()
                .map_err(Self::backend)?;
            deleted += 1;
        }
        debug!(
            target: "stampino::media",
            folder = folder.as_str(),
            tag,
            deleted,
            "tagged objects deleted"
        );
        Ok(deleted)
    }
}
