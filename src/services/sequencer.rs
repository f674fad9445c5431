// Alternates the displayed ad type between video ads and banner ads

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SEQUENCE_INTERVAL: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Video,
    Banner,
}

impl SequenceKind {
    pub fn flipped(self) -> Self {
        match self {
            SequenceKind::Video => SequenceKind::Banner,
            SequenceKind::Banner => SequenceKind::Video,
        }
    }
}

/// Which type to show first; videos lead when both exist
pub fn initial_sequence(video_count: usize, banner_count: usize) -> Option<SequenceKind> {
    match (video_count > 0, banner_count > 0) {
        (true, _) => Some(SequenceKind::Video),
        (false, true) => Some(SequenceKind::Banner),
        (false, false) => None,
    }
}

/// Only a mix of both types needs the outer timer
pub fn alternates(video_count: usize, banner_count: usize) -> bool {
    video_count > 0 && banner_count > 0
}

/// Outer timer of the showcase. Flips `current` every period while both ad
/// types are present; otherwise `current` never changes.
pub struct AdSequencer {
    current: watch::Receiver<Option<SequenceKind>>,
    cancel: CancellationToken,
}

impl AdSequencer {
    pub fn spawn(
        video_count: usize,
        banner_count: usize,
        period: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let initial = initial_sequence(video_count, banner_count);
        let (tx, rx) = watch::channel(initial);
        let cancel = parent.child_token();

        if let (true, Some(first)) = (alternates(video_count, banner_count), initial) {
            let token = cancel.clone();
            tokio::spawn(async move {
                let mut current = first;
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            current = current.flipped();
                            tx.send_replace(Some(current));
                        }
                    }
                }
            });
        }

        Self {
            current: rx,
            cancel,
        }
    }

    pub fn current(&self) -> Option<SequenceKind> {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SequenceKind>> {
        self.current.clone()
    }
}

impl Drop for AdSequencer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
