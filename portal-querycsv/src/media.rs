//! Remote media download
//!
//! Image fields arrive in spreadsheets as URLs. The fetcher downloads the
//! body, checks that it really is an image and stores it under the media
//! directory; the stored relative path becomes the field value.

use crate::error::MediaError;
use async_trait::async_trait;
use portal_common::config::MediaFetchConfig;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` and return the stored file's path relative to the media root
    async fn fetch(&self, url: &str) -> Result<String, MediaError>;
}

/// HTTP fetcher with a bounded retry loop
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    config: MediaFetchConfig,
    media_dir: PathBuf,
}

impl HttpMediaFetcher {
    pub fn new(media_dir: impl Into<PathBuf>, config: MediaFetchConfig) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("portal-querycsv/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::Request {
                url: String::new(),
                attempts: 0,
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            media_dir: media_dir.into(),
        })
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// GET with retries while the response is not 2xx/3xx
    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let max_attempts = self.config.max_attempts.max(1);
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(url, attempt, "Retrying media download");
            }

            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() || response.status().is_redirection() => {
                    let bytes = response.bytes().await.map_err(|e| MediaError::Request {
                        url: url.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    })?;

                    if attempt > 1 {
                        tracing::debug!(
                            url,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis() as u64,
                            "Media download succeeded after retry"
                        );
                    }
                    return Ok(bytes.to_vec());
                }
                Ok(response) => MediaError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                    attempts: attempt,
                },
                Err(e) => MediaError::Request {
                    url: url.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                },
            };

            if attempt >= max_attempts {
                tracing::warn!(url, attempt, error = %failure, "Media download failed: attempts exhausted");
                return Err(failure);
            }

            tracing::warn!(url, attempt, error = %failure, "Media download failed, will retry");
            tokio::time::sleep(self.config.retry_delay()).await;
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<String, MediaError> {
        reqwest::Url::parse(url).map_err(|_| MediaError::InvalidUrl { url: url.to_string() })?;

        let bytes = self.download(url).await?;
        let extension = image_extension(url, &bytes)?;

        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let storage_error = |e: std::io::Error| MediaError::Storage {
            url: url.to_string(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.media_dir).await.map_err(storage_error)?;
        tokio::fs::write(self.media_dir.join(&file_name), &bytes)
            .await
            .map_err(storage_error)?;

        tracing::info!(url, file = %file_name, bytes = bytes.len(), "Stored remote media");
        Ok(file_name)
    }
}

/// Extension of a sniffed image body
pub fn image_extension(url: &str, bytes: &[u8]) -> Result<&'static str, MediaError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(kind.extension()),
        Some(kind) => Err(MediaError::NotAnImage {
            url: url.to_string(),
            detected: kind.mime_type().to_string(),
        }),
        None => Err(MediaError::NotAnImage {
            url: url.to_string(),
            detected: "unknown".to_string(),
        }),
    }
}
