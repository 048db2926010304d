//! Fallback stills shown while no live frame is available

use crate::{Error, Result};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Default still-image host
pub const DEFAULT_THUMBNAIL_BASE_URL: &str = "http://i2.ytimg.com";

/// Default timeout for thumbnail requests (10 seconds)
pub const DEFAULT_FALLBACK_TIMEOUT_SECS: u64 = 10;

/// Loads the fallback still of a piece of content
#[async_trait]
pub trait FallbackImageLoader: Send + Sync {
    async fn load(&self, video_id: &str) -> Result<DynamicImage>;
}

/// Fetches `{base}/vi/{video_id}/mqdefault.jpg` over HTTP
#[derive(Debug, Clone)]
pub struct HttpFallbackLoader {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Default for HttpFallbackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFallbackLoader {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a loader with a custom reqwest::Client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_THUMBNAIL_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_FALLBACK_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the still for `video_id`
    pub fn image_url(&self, video_id: &str) -> String {
        format!(
            "{}/vi/{}/mqdefault.jpg",
            self.base_url.trim_end_matches('/'),
            video_id
        )
    }
}

#[async_trait]
impl FallbackImageLoader for HttpFallbackLoader {
    async fn load(&self, video_id: &str) -> Result<DynamicImage> {
        let url = self.image_url(video_id);
        let response = self.client.get(&url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(Error::FallbackImage(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        // image decoding is blocking
        tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| Error::FallbackImage(format!("decoder task failed: {}", e)))?
            .map_err(Error::from)
    }
}

/// Serves stills from memory; unknown ids fail to load
#[derive(Debug, Clone, Default)]
pub struct StaticFallbackLoader {
    images: HashMap<String, DynamicImage>,
}

impl StaticFallbackLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, video_id: impl Into<String>, image: DynamicImage) -> Self {
        self.images.insert(video_id.into(), image);
        self
    }
}

#[async_trait]
impl FallbackImageLoader for StaticFallbackLoader {
    async fn load(&self, video_id: &str) -> Result<DynamicImage> {
        self.images
            .get(video_id)
            .cloned()
            .ok_or_else(|| Error::FallbackImage(format!("no still for '{}'", video_id)))
    }
}
