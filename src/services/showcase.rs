// Ad showcase: one mounted dual-type sequencer with a video carousel and a
// banner carousel underneath it. The outer sequencer and both carousels run
// their own timers; unmounting cancels all of them at once.

use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::{AdKind, Advertisement};
use crate::services::carousel::{CarouselCommand, CarouselState, Rotator};
use crate::services::sequencer::{AdSequencer, SequenceKind};

#[derive(Debug, Clone, Copy)]
pub struct ShowcaseTimings {
    pub video_interval: Duration,
    pub banner_interval: Duration,
    pub sequence_interval: Duration,
}

struct Lane {
    ads: Vec<Advertisement>,
    rotator: Rotator,
}

pub struct Showcase {
    sequencer: AdSequencer,
    video: Option<Lane>,
    banner: Option<Lane>,
    unmounted: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneSnapshot {
    pub carousel: CarouselState,
    /// The ad under the carousel's current index, if it is visible
    pub current: Option<Advertisement>,
    pub ads: Vec<Advertisement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowcaseSnapshot {
    pub current_sequence: Option<SequenceKind>,
    pub video: Option<LaneSnapshot>,
    pub banner: Option<LaneSnapshot>,
}

impl Showcase {
    /// Split the pool by ad kind and start the timers. Unclassifiable ads are
    /// dropped.
    pub fn mount(ads: Vec<Advertisement>, timings: ShowcaseTimings) -> Self {
        let unmounted = CancellationToken::new();

        let (videos, banners): (Vec<_>, Vec<_>) = ads
            .into_iter()
            .filter(|ad| ad.kind().is_some())
            .partition(|ad| ad.kind() == Some(AdKind::Video));

        let sequencer = AdSequencer::spawn(
            videos.len(),
            banners.len(),
            timings.sequence_interval,
            &unmounted,
        );

        let lane = |ads: Vec<Advertisement>, interval: Duration| {
            if ads.is_empty() {
                None
            } else {
                let rotator = Rotator::spawn(ads.len(), interval, &unmounted);
                Some(Lane { ads, rotator })
            }
        };

        let video = lane(videos, timings.video_interval);
        let banner = lane(banners, timings.banner_interval);

        tracing::debug!(
            "Showcase mounted: {} video ads, {} banner ads, sequence {:?}",
            video.as_ref().map_or(0, |l| l.ads.len()),
            banner.as_ref().map_or(0, |l| l.ads.len()),
            sequencer.current()
        );

        Self {
            sequencer,
            video,
            banner,
            unmounted,
        }
    }

    fn lane(&self, kind: AdKind) -> Option<&Lane> {
        match kind {
            AdKind::Video => self.video.as_ref(),
            AdKind::Banner => self.banner.as_ref(),
        }
    }

    /// Forward a command to one carousel. Returns false if that lane is
    /// empty or its carousel has already been closed.
    pub fn command(&self, target: AdKind, command: CarouselCommand) -> bool {
        self.lane(target)
            .is_some_and(|lane| lane.rotator.send(command))
    }

    pub fn snapshot(&self) -> ShowcaseSnapshot {
        let lane_snapshot = |lane: &Lane| {
            let carousel = lane.rotator.state();
            let current = if carousel.is_visible {
                lane.ads.get(carousel.current_index).cloned()
            } else {
                None
            };
            LaneSnapshot {
                carousel,
                current,
                ads: lane.ads.clone(),
            }
        };

        ShowcaseSnapshot {
            current_sequence: self.sequencer.current(),
            video: self.video.as_ref().map(lane_snapshot),
            banner: self.banner.as_ref().map(lane_snapshot),
        }
    }

    /// Cancel every timer owned by this showcase
    pub fn unmount(&self) {
        self.unmounted.cancel();
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.is_cancelled()
    }

    /// Snapshot stream: the current state first, then one snapshot per
    /// change of the sequence or either carousel. Ends on unmount.
    pub fn events(self: Arc<Self>) -> impl Stream<Item = ShowcaseSnapshot> {
        let watchers = Watchers {
            sequence: Some(self.sequencer.subscribe()),
            video: self.video.as_ref().map(|l| l.rotator.subscribe()),
            banner: self.banner.as_ref().map(|l| l.rotator.subscribe()),
        };

        futures::stream::unfold(
            (self, watchers, true),
            |(showcase, mut watchers, first)| async move {
                if first {
                    let snapshot = showcase.snapshot();
                    return Some((snapshot, (showcase, watchers, false)));
                }

                tokio::select! {
                    _ = showcase.unmounted.cancelled() => None,
                    changed = watchers.changed() => {
                        if !changed {
                            return None;
                        }
                        let snapshot = showcase.snapshot();
                        Some((snapshot, (showcase, watchers, false)))
                    }
                }
            },
        )
    }
}

impl Drop for Showcase {
    fn drop(&mut self) {
        self.unmounted.cancel();
    }
}

struct Watchers {
    sequence: Option<watch::Receiver<Option<SequenceKind>>>,
    video: Option<watch::Receiver<CarouselState>>,
    banner: Option<watch::Receiver<CarouselState>>,
}

impl Watchers {
    /// Wait for any watched value to change. Receivers whose task has ended
    /// are dropped; returns false once nothing is left to watch.
    async fn changed(&mut self) -> bool {
        loop {
            if self.sequence.is_none() && self.video.is_none() && self.banner.is_none() {
                return false;
            }

            tokio::select! {
                r = wait(&mut self.sequence) => match r {
                    Ok(()) => return true,
                    Err(_) => self.sequence = None,
                },
                r = wait(&mut self.video) => match r {
                    Ok(()) => return true,
                    Err(_) => self.video = None,
                },
                r = wait(&mut self.banner) => match r {
                    Ok(()) => return true,
                    Err(_) => self.banner = None,
                },
            }
        }
    }
}

async fn wait<T>(rx: &mut Option<watch::Receiver<T>>) -> Result<(), watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}
