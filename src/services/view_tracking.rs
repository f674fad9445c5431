// At-most-once view counting for a playback session

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::future::Future;
use tokio::sync::Mutex;

pub const DEFAULT_VIEW_THRESHOLD_SECS: f64 = 30.0;

/// Where view increments are written. The returned count is authoritative.
pub trait ViewStore: Send + Sync {
    fn increment_views(
        &self,
        content_id: &str,
        last_known: i64,
    ) -> impl Future<Output = Result<i64>> + Send;
}

impl ViewStore for SqlitePool {
    async fn increment_views(&self, content_id: &str, last_known: i64) -> Result<i64> {
        crate::db::increment_views(self, content_id, last_known).await
    }
}

/// The per-session guard state
#[derive(Debug, Clone)]
pub struct ViewGuard {
    has_tracked_view: bool,
    current_views: i64,
    threshold_secs: f64,
}

impl ViewGuard {
    pub fn new(seed_views: i64, threshold_secs: f64) -> Self {
        Self {
            has_tracked_view: false,
            current_views: seed_views,
            threshold_secs,
        }
    }

    pub fn has_tracked_view(&self) -> bool {
        self.has_tracked_view
    }

    pub fn current_views(&self) -> i64 {
        self.current_views
    }

    /// Decide whether this progress report counts as a view. When it does,
    /// the guard is marked before returning and the caller receives the
    /// last-known count to increment from.
    pub fn evaluate(
        &mut self,
        is_playing: bool,
        current_time_secs: f64,
        ad_is_playing: bool,
    ) -> Option<i64> {
        if !is_playing
            || ad_is_playing
            || self.has_tracked_view
            || !(current_time_secs > self.threshold_secs)
        {
            return None;
        }

        self.has_tracked_view = true;
        Some(self.current_views)
    }

    /// Take the store's count as the new last-known value
    pub fn adopt(&mut self, views: i64) {
        self.current_views = views;
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PlaybackProgress {
    pub current_time: f64,
    pub is_playing: bool,
    pub ad_is_playing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub content_id: String,
    pub has_tracked_view: bool,
    pub current_views: i64,
    /// True only for the report that issued the increment
    pub fired: bool,
    pub progress: PlaybackProgress,
}

/// One mounted player against one content id. A new content id means a new
/// session with a fresh guard.
pub struct PlaybackSession {
    content_id: String,
    guard: Mutex<ViewGuard>,
    progress: Mutex<PlaybackProgress>,
}

impl PlaybackSession {
    /// `seed_views` must come from a fresh read of the content row
    pub fn new(content_id: impl Into<String>, seed_views: i64, threshold_secs: f64) -> Self {
        Self {
            content_id: content_id.into(),
            guard: Mutex::new(ViewGuard::new(seed_views, threshold_secs)),
            progress: Mutex::new(PlaybackProgress::default()),
        }
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Record a progress report and count the view if it qualifies.
    ///
    /// The guard flag flips under the lock before the store is called, so
    /// overlapping reports cannot issue a second increment. A failed
    /// increment is not retried.
    pub async fn track_view<S: ViewStore>(
        &self,
        store: &S,
        is_playing: bool,
        current_time: f64,
        ad_is_playing: bool,
    ) -> ViewSnapshot {
        let progress = PlaybackProgress {
            current_time,
            is_playing,
            ad_is_playing,
        };
        *self.progress.lock().await = progress;

        let last_known = self
            .guard
            .lock()
            .await
            .evaluate(is_playing, current_time, ad_is_playing);

        let fired = last_known.is_some();
        if let Some(last_known) = last_known {
            match store.increment_views(&self.content_id, last_known).await {
                Ok(views) => {
                    tracing::info!("View recorded: content={}, views={}", self.content_id, views);
                    self.guard.lock().await.adopt(views);
                }
                Err(e) => {
                    tracing::warn!("Failed to record view for {}: {}", self.content_id, e);
                }
            }
        }

        let guard = self.guard.lock().await;
        ViewSnapshot {
            content_id: self.content_id.clone(),
            has_tracked_view: guard.has_tracked_view(),
            current_views: guard.current_views(),
            fired,
            progress,
        }
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let progress = *self.progress.lock().await;
        let guard = self.guard.lock().await;
        ViewSnapshot {
            content_id: self.content_id.clone(),
            has_tracked_view: guard.has_tracked_view(),
            current_views: guard.current_views(),
            fired: false,
            progress,
        }
    }
}
