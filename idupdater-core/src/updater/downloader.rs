//! Package downloader - streams the installer to disk with progress reporting

use crate::error::{Result, UpdaterError};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Download progress callback type
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// File name used when the URL has no usable final segment
const FALLBACK_FILE_NAME: &str = "update.msi";

/// Artifact transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Download `url` to a local file and return its path
    ///
    /// On error no file is left behind.
    async fn download(&self, url: &str, on_progress: ProgressCallback) -> Result<PathBuf>;
}

/// Local file name derived from the final path segment of `url`
pub fn file_name_for(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(|s| s.replace(['\\', '/'], "_"))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// HTTP transport backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl HttpTransport {
    /// Transport writing into `download_dir`
    pub fn new(user_agent: &str, download_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(600)) // 10 minute timeout for large files
            .build()
            .map_err(|e| UpdaterError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, download_dir })
    }

    /// Transport writing into the OS temp directory
    pub fn in_temp_dir(user_agent: &str) -> Result<Self> {
        Self::new(user_agent, std::env::temp_dir())
    }

    async fn fetch_to(&self, url: url::Url, dest_path: &Path, on_progress: &ProgressCallback) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::Transport(format!("Download request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Transport(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        info!("Download size: {} bytes", total_size);

        let mut file = File::create(dest_path)
            .await
            .map_err(|e| UpdaterError::Transport(format!("Failed to create file: {}", e)))?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result
                .map_err(|e| UpdaterError::Transport(format!("Error reading chunk: {}", e)))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::Transport(format!("Error writing to file: {}", e)))?;

            downloaded += chunk.len() as u64;
            on_progress(downloaded, total_size);
            debug!("Downloaded {}/{} bytes", downloaded, total_size);
        }

        file.flush()
            .await
            .map_err(|e| UpdaterError::Transport(format!("Error flushing file: {}", e)))?;

        if total_size > 0 && downloaded != total_size {
            error!(
                "Downloaded size mismatch: expected {}, got {}",
                total_size, downloaded
            );
            return Err(UpdaterError::Transport(format!(
                "Download incomplete: expected {} bytes, got {}",
                total_size, downloaded
            )));
        }

        info!("Download complete: {} bytes", downloaded);
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &str, on_progress: ProgressCallback) -> Result<PathBuf> {
        let url = url::Url::parse(url)
            .map_err(|e| UpdaterError::Transport(format!("Invalid download URL '{}': {}", url, e)))?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| UpdaterError::Transport(format!("Failed to create download directory: {}", e)))?;

        let dest_path = self.download_dir.join(file_name_for(&url));
        info!("Downloading update to: {}", dest_path.display());

        match self.fetch_to(url, &dest_path, &on_progress).await {
            Ok(()) => Ok(dest_path),
            Err(e) => {
                // Clean up partial file
                let _ = tokio::fs::remove_file(&dest_path).await;
                Err(e)
            }
        }
    }
}
