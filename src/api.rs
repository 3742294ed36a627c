pub(crate) mod drive;
pub(crate) mod payments;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

/// One catalog entry as reported by the storage listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct VideoFile {
    pub(crate) id: String,
    pub(crate) name: String,
}

#[async_trait]
pub(crate) trait VideoStorage {
    /// Fresh catalog of available videos; fetched per request, never cached.
    async fn list_videos(&self) -> Result<Vec<VideoFile>, anyhow::Error>;
    /// Downloads one video into the temp directory and returns its path.
    async fn download(&self, id: &str) -> Result<PathBuf, anyhow::Error>;
}
