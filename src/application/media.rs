//! Seam over the external object store holding user media.

use async_trait::async_trait;
use thiserror::Error;

/// Folders the object store is partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFolder {
    /// Uploaded background images.
    Main,
    /// Rendered preview composites.
    Preview,
}

impl MediaFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Preview => "preview",
        }
    }
}

/// A stored object as the backend reports it after upload.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub asset_id: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media backend request failed")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("media backend returned an unusable response: {detail}")]
    BadResponse { detail: String },
}

/// Remote object storage. Assets are tagged with the owning user's code so
/// they can be purged wholesale when the account goes away.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download an object by its public URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;

    /// Upload into a folder, tagged with the owner's code.
    async fn upload(
        &self,
        folder: MediaFolder,
        file_name: &str,
        bytes: Vec<u8>,
        tag: &str,
    ) -> Result<StoredAsset, MediaError>;

    /// Delete every object in a folder carrying the tag. Returns how many
    /// objects went away.
    async fn delete_by_tag(&self, folder: MediaFolder, tag: &str) -> Result<u64, MediaError>;
}
