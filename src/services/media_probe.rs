// Media URL validation and bounded-wait readiness probing for video ads

use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;

use crate::models::{AdKind, Advertisement};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

static HTTP_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap());

// Containers and stream manifests a player can open
static VIDEO_EXT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(mp4|webm|ogg|ogv|mov|m4v|m3u8|mpd)(\?[^\s]*)?$").unwrap()
});

static IMAGE_EXT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp|avif|svg)(\?[^\s]*)?$").unwrap());

/// Absolute http(s) URL
pub fn is_valid_url(url: &str) -> bool {
    HTTP_URL_REGEX.is_match(url.trim())
}

/// Absolute URL pointing at a playable video container or stream manifest
pub fn is_video_url(url: &str) -> bool {
    is_valid_url(url) && VIDEO_EXT_REGEX.is_match(url.trim())
}

pub fn is_image_url(url: &str) -> bool {
    is_valid_url(url) && IMAGE_EXT_REGEX.is_match(url.trim())
}

/// Outcome of a readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Definitive failure (error status or connection error)
    Unavailable(String),
    /// No answer in time; treated as playable
    TimedOut,
}

impl Readiness {
    pub fn is_playable(&self) -> bool {
        !matches!(self, Readiness::Unavailable(_))
    }
}

#[derive(Clone)]
pub struct MediaProbe {
    client: Client,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Ask the media host whether the URL is servable. Waits at most the
    /// configured timeout, then proceeds as if the media were fine.
    pub async fn check(&self, url: &str) -> Readiness {
        if !is_valid_url(url) {
            return Readiness::Unavailable("invalid URL".to_string());
        }

        match tokio::time::timeout(self.timeout, self.client.head(url).send()).await {
            Err(_) => {
                tracing::debug!("Readiness probe timed out for {}, assuming playable", url);
                Readiness::TimedOut
            }
            Ok(Ok(response)) if response.status().is_success() => Readiness::Ready,
            Ok(Ok(response)) => Readiness::Unavailable(format!("HTTP {}", response.status())),
            Ok(Err(e)) => Readiness::Unavailable(e.to_string()),
        }
    }

    /// Drop video ads whose media is definitively broken. Banner ads pass
    /// through untouched; probes run concurrently.
    pub async fn retain_playable(&self, ads: Vec<Advertisement>) -> Vec<Advertisement> {
        let checks = ads.iter().map(|ad| async move {
            match (ad.kind(), ad.video_url.as_deref()) {
                (Some(AdKind::Video), Some(url)) => self.check(url).await,
                _ => Readiness::Ready,
            }
        });
        let results = join_all(checks).await;

        ads.into_iter()
            .zip(results)
            .filter_map(|(ad, readiness)| {
                if readiness.is_playable() {
                    Some(ad)
                } else {
                    tracing::warn!(
                        "Skipping ad '{}': video unavailable ({:?})",
                        ad.title,
                        readiness
                    );
                    None
                }
            })
            .collect()
    }
}
