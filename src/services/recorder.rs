// Voice message recorder: idle -> recording -> recorded -> sent | discarded.
//
// The capture handle is an RAII value held only by the `Recording` phase;
// every way out of that phase drops it, which releases the device.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("Capture device is already in use")]
    DeviceBusy,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RecorderState,
    },

    #[error("Recording contains no audio")]
    EmptyRecording,

    #[error("Recording exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Recorded,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

/// Something that hands out exclusive capture handles. Dropping the handle
/// releases the device.
pub trait CaptureDevice {
    type Handle: Send;

    fn acquire(&self) -> Result<Self::Handle, RecorderError>;
}

/// Capture slots keyed by owner. At most one active recording per owner.
#[derive(Clone, Default)]
pub struct CaptureSlots {
    held: Arc<Mutex<HashSet<String>>>,
}

impl CaptureSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device view for a single owner
    pub fn for_owner(&self, owner: impl Into<String>) -> OwnerCapture {
        OwnerCapture {
            slots: self.clone(),
            owner: owner.into(),
        }
    }

    pub fn is_held(&self, owner: &str) -> bool {
        self.lock().contains(owner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct OwnerCapture {
    slots: CaptureSlots,
    owner: String,
}

impl CaptureDevice for OwnerCapture {
    type Handle = CaptureSlot;

    fn acquire(&self) -> Result<CaptureSlot, RecorderError> {
        if !self.slots.lock().insert(self.owner.clone()) {
            return Err(RecorderError::DeviceBusy);
        }
        tracing::debug!("Capture slot acquired by {}", self.owner);
        Ok(CaptureSlot {
            slots: self.slots.clone(),
            owner: self.owner.clone(),
        })
    }
}

/// Held slot; released on drop
pub struct CaptureSlot {
    slots: CaptureSlots,
    owner: String,
}

impl Drop for CaptureSlot {
    fn drop(&mut self) {
        self.slots.lock().remove(&self.owner);
        tracing::debug!("Capture slot released by {}", self.owner);
    }
}

/// A finalized recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceClip {
    pub audio: Vec<u8>,
    pub duration_seconds: u64,
}

enum Phase<H> {
    Idle,
    Recording { _handle: H, chunks: Vec<Vec<u8>>, size: usize },
    Recorded(VoiceClip),
}

/// Cosmetic 1-second counter, cancelled on drop
struct ElapsedTicker {
    cancel: CancellationToken,
}

impl ElapsedTicker {
    fn spawn(elapsed: Arc<AtomicU64>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        elapsed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        Self { cancel }
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Recorder<H> {
    phase: Phase<H>,
    elapsed: Arc<AtomicU64>,
    ticker: Option<ElapsedTicker>,
    max_bytes: usize,
}

impl<H: Send> Recorder<H> {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            phase: Phase::Idle,
            elapsed: Arc::new(AtomicU64::new(0)),
            ticker: None,
            max_bytes,
        }
    }

    pub fn state(&self) -> RecorderState {
        match self.phase {
            Phase::Idle => RecorderState::Idle,
            Phase::Recording { .. } => RecorderState::Recording,
            Phase::Recorded(_) => RecorderState::Recorded,
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Bytes captured so far (recording) or in the finalized clip
    pub fn size(&self) -> usize {
        match &self.phase {
            Phase::Idle => 0,
            Phase::Recording { size, .. } => *size,
            Phase::Recorded(clip) => clip.audio.len(),
        }
    }

    /// Acquire the device and begin capturing. On acquisition failure the
    /// recorder stays idle.
    pub fn start<D>(&mut self, device: &D) -> Result<(), RecorderError>
    where
        D: CaptureDevice<Handle = H>,
    {
        if !matches!(self.phase, Phase::Idle) {
            return Err(self.invalid("start"));
        }

        let handle = device.acquire()?;
        self.elapsed.store(0, Ordering::Relaxed);
        self.ticker = Some(ElapsedTicker::spawn(self.elapsed.clone()));
        self.phase = Phase::Recording {
            _handle: handle,
            chunks: Vec::new(),
            size: 0,
        };
        Ok(())
    }

    /// Append captured audio. Oversized chunks are rejected without
    /// ending the recording.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) -> Result<(), RecorderError> {
        let limit = self.max_bytes;
        match &mut self.phase {
            Phase::Recording { chunks, size, .. } => {
                if *size + chunk.len() > limit {
                    return Err(RecorderError::TooLarge { limit });
                }
                *size += chunk.len();
                chunks.push(chunk);
                Ok(())
            }
            _ => Err(self.invalid("add audio")),
        }
    }

    /// Finalize the capture. The device is released before finalization so
    /// it is freed even when finalization fails; on failure the recorder
    /// returns to idle.
    pub fn stop(&mut self) -> Result<&VoiceClip, RecorderError> {
        if !matches!(self.phase, Phase::Recording { .. }) {
            return Err(self.invalid("stop"));
        }

        self.ticker = None;
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let Phase::Recording { _handle, chunks, .. } = phase else {
            unreachable!("phase checked above");
        };
        drop(_handle);

        if chunks.iter().all(Vec::is_empty) {
            self.elapsed.store(0, Ordering::Relaxed);
            return Err(RecorderError::EmptyRecording);
        }

        let clip = VoiceClip {
            audio: chunks.concat(),
            duration_seconds: self.elapsed_seconds(),
        };
        self.phase = Phase::Recorded(clip);

        match &self.phase {
            Phase::Recorded(clip) => Ok(clip),
            _ => unreachable!("phase set above"),
        }
    }

    /// Hand the clip to `on_send`. On success the recorder clears and
    /// returns to idle; on failure the clip is kept so the caller can retry.
    pub async fn send<F, Fut, T, E>(&mut self, on_send: F) -> Result<T, E>
    where
        F: FnOnce(VoiceClip) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RecorderError>,
    {
        let clip = match &self.phase {
            Phase::Recorded(clip) => clip.clone(),
            _ => return Err(self.invalid("send").into()),
        };

        let sent = on_send(clip).await?;
        self.reset();
        Ok(sent)
    }

    /// Throw away the recording. Also aborts a capture in progress, which
    /// releases the device.
    pub fn discard(&mut self) -> Result<(), RecorderError> {
        if matches!(self.phase, Phase::Idle) {
            return Err(self.invalid("discard"));
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.ticker = None;
        self.phase = Phase::Idle;
        self.elapsed.store(0, Ordering::Relaxed);
    }

    fn invalid(&self, action: &'static str) -> RecorderError {
        RecorderError::InvalidState {
            action,
            state: self.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const LIMIT: usize = 1024;

    /// Exclusive device that counts acquisitions and releases
    #[derive(Default)]
    struct TestDevice {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        busy: Arc<Mutex<bool>>,
        broken: bool,
    }

    struct TestHandle {
        released: Arc<AtomicUsize>,
        busy: Arc<Mutex<bool>>,
    }

    impl Drop for TestHandle {
        fn drop(&mut self) {
            *self.busy.lock().unwrap() = false;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CaptureDevice for TestDevice {
        type Handle = TestHandle;

        fn acquire(&self) -> Result<TestHandle, RecorderError> {
            if self.broken {
                return Err(RecorderError::DeviceUnavailable("no microphone".into()));
            }
            let mut busy = self.busy.lock().unwrap();
            if *busy {
                return Err(RecorderError::DeviceBusy);
            }
            *busy = true;
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(TestHandle {
                released: self.released.clone(),
                busy: self.busy.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_full_cycle_send() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);

        rec.start(&device).unwrap();
        assert_eq!(rec.state(), RecorderState::Recording);
        rec.push_chunk(vec![1, 2]).unwrap();
        rec.push_chunk(vec![3]).unwrap();

        let clip = rec.stop().unwrap();
        assert_eq!(clip.audio, vec![1, 2, 3]);
        assert_eq!(device.released.load(Ordering::SeqCst), 1);

        let mut delivered = None;
        let sent: Result<(), RecorderError> = rec
            .send(|clip| {
                delivered = Some(clip);
                async { Ok(()) }
            })
            .await;
        sent.unwrap();

        assert_eq!(delivered.unwrap().audio, vec![1, 2, 3]);
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.elapsed_seconds(), 0);
        assert_eq!(rec.size(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_clip() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);
        rec.start(&device).unwrap();
        rec.push_chunk(vec![9; 4]).unwrap();
        rec.stop().unwrap();

        let result: Result<(), RecorderError> = rec
            .send(|_| async { Err(RecorderError::DeviceUnavailable("upload failed".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(rec.state(), RecorderState::Recorded);
        assert_eq!(rec.size(), 4);
    }

    #[tokio::test]
    async fn test_discard_then_restart() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);

        rec.start(&device).unwrap();
        rec.push_chunk(vec![1]).unwrap();
        rec.stop().unwrap();
        rec.discard().unwrap();
        assert_eq!(rec.state(), RecorderState::Idle);

        rec.start(&device).unwrap();
        assert_eq!(device.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(device.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_stop_releases_device() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);

        rec.start(&device).unwrap();
        assert_eq!(rec.stop().unwrap_err(), RecorderError::EmptyRecording);
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(device.released.load(Ordering::SeqCst), 1);

        // Device is free again
        rec.start(&device).unwrap();
    }

    #[tokio::test]
    async fn test_abort_while_recording_releases_once() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);

        rec.start(&device).unwrap();
        rec.discard().unwrap();
        assert_eq!(device.released.load(Ordering::SeqCst), 1);
        assert!(rec.discard().is_err());
        assert_eq!(device.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_while_recording_releases() {
        let device = TestDevice::default();
        {
            let mut rec = Recorder::new(LIMIT);
            rec.start(&device).unwrap();
        }
        assert_eq!(device.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_failure_stays_idle() {
        let device = TestDevice {
            broken: true,
            ..Default::default()
        };
        let mut rec: Recorder<TestHandle> = Recorder::new(LIMIT);
        assert!(matches!(
            rec.start(&device),
            Err(RecorderError::DeviceUnavailable(_))
        ));
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);

        assert!(rec.stop().is_err());
        assert!(rec.push_chunk(vec![1]).is_err());
        rec.start(&device).unwrap();
        assert_eq!(
            rec.start(&device).unwrap_err(),
            RecorderError::InvalidState {
                action: "start",
                state: RecorderState::Recording
            }
        );
        // Second start never touched the device
        assert_eq!(device.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(4);
        rec.start(&device).unwrap();
        rec.push_chunk(vec![0; 3]).unwrap();
        assert_eq!(
            rec.push_chunk(vec![0; 2]).unwrap_err(),
            RecorderError::TooLarge { limit: 4 }
        );
        assert_eq!(rec.state(), RecorderState::Recording);
        assert_eq!(rec.size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_counter_ticks_while_recording() {
        let device = TestDevice::default();
        let mut rec = Recorder::new(LIMIT);
        rec.start(&device).unwrap();
        rec.push_chunk(vec![1]).unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(rec.elapsed_seconds(), 3);

        let clip = rec.stop().unwrap();
        assert_eq!(clip.duration_seconds, 3);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rec.elapsed_seconds(), 3);
    }

    #[test]
    fn test_capture_slots_are_exclusive_per_owner() {
        let slots = CaptureSlots::new();
        let alice = slots.for_owner("alice");

        let held = alice.acquire().unwrap();
        assert!(slots.is_held("alice"));
        assert_eq!(alice.acquire().err(), Some(RecorderError::DeviceBusy));
        assert!(slots.for_owner("bob").acquire().is_ok());

        drop(held);
        assert!(!slots.is_held("alice"));
        assert!(alice.acquire().is_ok());
    }
}
