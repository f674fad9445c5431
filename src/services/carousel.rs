// Rotating carousel of ads/banners.
//
// `Carousel` is the plain state machine. `Rotator` owns one carousel inside a
// spawned task that drives the auto-advance timer; dropping the rotator
// cancels the task.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BANNER_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_VIDEO_INTERVAL: Duration = Duration::from_millis(8000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CarouselState {
    pub len: usize,
    pub current_index: usize,
    pub is_visible: bool,
    pub is_hovered: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone)]
pub struct Carousel {
    state: CarouselState,
}

impl Carousel {
    pub fn new(len: usize) -> Self {
        Self {
            state: CarouselState {
                len,
                current_index: 0,
                is_visible: true,
                is_hovered: false,
                is_paused: false,
            },
        }
    }

    pub fn state(&self) -> CarouselState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    /// Whether the auto-advance timer should be armed
    pub fn is_running(&self) -> bool {
        let s = &self.state;
        s.len > 1 && s.is_visible && !s.is_hovered && !s.is_paused
    }

    /// Timer tick. Returns false when the carousel is not running.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.advance();
        true
    }

    pub fn next(&mut self) {
        if self.state.is_visible && self.state.len > 0 {
            self.advance();
        }
    }

    pub fn previous(&mut self) {
        let s = &mut self.state;
        if s.is_visible && s.len > 0 {
            s.current_index = (s.current_index + s.len - 1) % s.len;
        }
    }

    /// Jump to `index`; out-of-range indices are ignored
    pub fn go_to(&mut self, index: usize) -> bool {
        if !self.state.is_visible || index >= self.state.len {
            return false;
        }
        self.state.current_index = index;
        true
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        self.state.is_hovered = hovered;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.is_paused = paused;
    }

    /// Hide for the rest of this instance's life
    pub fn close(&mut self) {
        self.state.is_visible = false;
    }

    /// The item list changed identity: start over from the first item
    pub fn replace_items(&mut self, len: usize) {
        self.state.len = len;
        self.state.current_index = 0;
    }

    fn advance(&mut self) {
        let s = &mut self.state;
        s.current_index = (s.current_index + 1) % s.len;
    }
}

/// User or page actions against a mounted carousel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CarouselCommand {
    Next,
    Previous,
    GoTo { index: usize },
    Hover,
    Unhover,
    Pause,
    Resume,
    Close,
    ReplaceItems { len: usize },
}

impl Carousel {
    /// Apply a command. Returns true when the timer must restart from a
    /// fresh full period.
    pub fn apply(&mut self, command: CarouselCommand) -> bool {
        let was_running = self.is_running();

        // Manual navigation keeps the current timer phase
        let restart = match command {
            CarouselCommand::Next => {
                self.next();
                false
            }
            CarouselCommand::Previous => {
                self.previous();
                false
            }
            CarouselCommand::GoTo { index } => {
                self.go_to(index);
                false
            }
            CarouselCommand::Hover => {
                self.set_hovered(true);
                false
            }
            CarouselCommand::Unhover => {
                self.set_hovered(false);
                false
            }
            CarouselCommand::Pause => {
                self.set_paused(true);
                false
            }
            CarouselCommand::Resume => {
                self.set_paused(false);
                false
            }
            CarouselCommand::Close => {
                self.close();
                false
            }
            CarouselCommand::ReplaceItems { len } => {
                self.replace_items(len);
                true
            }
        };

        restart || (!was_running && self.is_running())
    }
}

/// A mounted carousel with its own auto-advance timer task
pub struct Rotator {
    commands: mpsc::UnboundedSender<CarouselCommand>,
    state: watch::Receiver<CarouselState>,
    cancel: CancellationToken,
}

impl Rotator {
    /// Mount a carousel of `len` items. The timer task stops when `parent`
    /// is cancelled, when the carousel is closed, or when the rotator drops.
    pub fn spawn(len: usize, interval: Duration, parent: &CancellationToken) -> Self {
        let carousel = Carousel::new(len);
        let (state_tx, state_rx) = watch::channel(carousel.state());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = parent.child_token();

        tokio::spawn(run_rotation(
            carousel,
            interval,
            cmd_rx,
            state_tx,
            cancel.clone(),
        ));

        Self {
            commands: cmd_tx,
            state: state_rx,
            cancel,
        }
    }

    /// Queue a command. Returns false once the rotation task has ended.
    pub fn send(&self, command: CarouselCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn state(&self) -> CarouselState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CarouselState> {
        self.state.clone()
    }
}

impl Drop for Rotator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_rotation(
    mut carousel: Carousel,
    interval: Duration,
    mut commands: mpsc::UnboundedReceiver<CarouselCommand>,
    state: watch::Sender<CarouselState>,
    cancel: CancellationToken,
) {
    let mut deadline = Instant::now() + interval;

    loop {
        let running = carousel.is_running();

        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                if carousel.apply(command) {
                    deadline = Instant::now() + interval;
                }
                state.send_replace(carousel.state());
            }
            _ = tokio::time::sleep_until(deadline), if running => {
                carousel.tick();
                deadline += interval;
                state.send_replace(carousel.state());
            }
        }

        if !carousel.state().is_visible {
            tracing::debug!("Carousel closed, stopping rotation");
            break;
        }
    }
}
