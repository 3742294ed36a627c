use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::api::{VideoFile, VideoStorage};
use crate::config::DriveCredentials;

const DRIVE_API_URL: &str = "https://www.googleapis.com";

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<VideoFile>,
}

/// Google Drive v3 client scoped to listing and fetching video files.
pub(crate) struct DriveApi {
    client: Client,
    base_url: String,
    access_token: String,
    temp_dir: PathBuf,
}

impl DriveApi {
    pub(crate) fn new(credentials: &DriveCredentials, temp_dir: &Path) -> Self {
        Self::with_base_url(DRIVE_API_URL.to_string(), credentials, temp_dir)
    }

    fn with_base_url(base_url: String, credentials: &DriveCredentials, temp_dir: &Path) -> Self {
        Self {
            client: Client::new(),
            base_url,
            access_token: credentials.access_token.clone(),
            temp_dir: temp_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl VideoStorage for DriveApi {
    async fn list_videos(&self) -> Result<Vec<VideoFile>, anyhow::Error> {
        let url = format!("{}/drive/v3/files", self.base_url);
        log::info!("Requesting video listing from {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", "mimeType contains 'video/'"),
                ("fields", "files(id, name)"),
            ])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Video listing request failed")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Video listing failed with status {}:\n{}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }
        let listing: FileList = response
            .json()
            .await
            .context("Failed to decode video listing response")?;
        Ok(listing.files)
    }

    async fn download(&self, id: &str) -> Result<PathBuf, anyhow::Error> {
        let url = format!("{}/drive/v3/files/{}", self.base_url, id);
        log::info!("Downloading video {}", id);
        let response = self
            .client
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Download request for {} failed", id))?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Download of {} failed with status {}",
                id,
                response.status()
            ));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read download body for {}", id))?;
        let path = self.temp_dir.join(format!("{}.mp4", id));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Temp artifacts are removed on every exit path after a successful
/// download, including send failures.
pub(crate) async fn remove_temp_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove temp file {}: {}", path.display(), e);
    }
}
