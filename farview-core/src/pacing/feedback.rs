//! Per-client frame feedback.
//!
//! Tracks how long the server takes to encode a frame (rolling average)
//! and how long the client says it spends on one (telemetry), and
//! delays frame callbacks by the larger of the two. Until a client has
//! reported telemetry recently, its callbacks are parked instead of
//! scheduled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::FarviewError;
use crate::lock;
use crate::native::{ClientId, NativeClient};
use crate::pacing::scheduler::{FrameScheduler, PendingFrame};
use crate::pacing::telemetry::Telemetry;
use crate::pacing::wire::{buffer_release_record, frame_done_records};

struct FeedbackState {
    server_durations: VecDeque<Duration>,
    avg_server: Duration,
    client_processing: Duration,
    last_telemetry: Option<Instant>,
    parked: Vec<PendingFrame>,
    callback_delay: Duration,
}

impl FeedbackState {
    /// Larger of the two costs, floored to whole milliseconds.
    fn recompute_delay(&mut self) {
        let delay = self.avg_server.max(self.client_processing);
        self.callback_delay = Duration::from_millis(delay.as_millis() as u64);
    }
}

/// Frame feedback controller for one client.
pub struct FrameFeedback {
    client: Arc<dyn NativeClient>,
    scheduler: FrameScheduler,
    state: Mutex<FeedbackState>,
    destroyed: AtomicBool,
    telemetry_pump: Mutex<Option<JoinHandle<()>>>,
}

impl FrameFeedback {
    pub fn new(client: Arc<dyn NativeClient>, scheduler: FrameScheduler) -> Arc<Self> {
        Arc::new(Self {
            client,
            scheduler,
            state: Mutex::new(FeedbackState {
                server_durations: VecDeque::new(),
                avg_server: Duration::ZERO,
                client_processing: Duration::ZERO,
                last_telemetry: None,
                parked: Vec::new(),
                callback_delay: Duration::ZERO,
            }),
            destroyed: AtomicBool::new(false),
            telemetry_pump: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client.id()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn callback_delay(&self) -> Duration {
        lock(&self.state).callback_delay
    }

    pub fn average_server_duration(&self) -> Duration {
        lock(&self.state).avg_server
    }

    pub fn client_processing_duration(&self) -> Duration {
        lock(&self.state).client_processing
    }

    pub fn parked_len(&self) -> usize {
        lock(&self.state).parked.len()
    }

    // ── Inputs ───────────────────────────────────────────────────

    /// Apply one telemetry message received now.
    pub fn on_telemetry(&self, data: &[u8]) -> Result<(), FarviewError> {
        self.on_telemetry_at(Instant::now(), data)
    }

    /// Apply one telemetry message received at `now`.
    ///
    /// Parked callbacks move to the shared queue and the scheduler is
    /// asked for the client's refresh interval.
    pub fn on_telemetry_at(&self, now: Instant, data: &[u8]) -> Result<(), FarviewError> {
        if self.is_destroyed() {
            return Ok(());
        }
        let telemetry = Telemetry::decode(data)?;

        let parked = {
            let mut state = lock(&self.state);
            state.last_telemetry = Some(now);
            state.client_processing = telemetry.processing_duration();
            state.recompute_delay();
            std::mem::take(&mut state.parked)
        };
        trace!(
            client = %self.client.id(),
            refresh_ms = telemetry.refresh_interval_ms,
            processing_ms = telemetry.processing_duration_ms,
            "telemetry"
        );

        if !parked.is_empty() {
            debug!(client = %self.client.id(), count = parked.len(), "releasing parked frames");
            self.scheduler.enqueue_all(parked);
        }
        self.scheduler.request_interval(telemetry.refresh_interval());
        Ok(())
    }

    /// Record that a frame committed at `commit` finished encoding now.
    pub fn encoding_done(&self, commit: Instant) {
        self.encoding_done_at(Instant::now(), commit);
    }

    pub fn encoding_done_at(&self, now: Instant, commit: Instant) {
        let window = self.scheduler.config().window.max(1);
        let mut state = lock(&self.state);
        state
            .server_durations
            .push_back(now.saturating_duration_since(commit));
        while state.server_durations.len() > window {
            state.server_durations.pop_front();
        }
        let total: Duration = state.server_durations.iter().sum();
        state.avg_server = total / state.server_durations.len() as u32;
        state.recompute_delay();
    }

    /// Schedule `callback_ids` to be retired after the current delay.
    pub fn commit_notify(self: &Arc<Self>, callback_ids: Vec<u32>) {
        self.commit_notify_at(Instant::now(), callback_ids);
    }

    pub fn commit_notify_at(self: &Arc<Self>, now: Instant, callback_ids: Vec<u32>) {
        if callback_ids.is_empty() || self.is_destroyed() {
            return;
        }

        let weak = Arc::downgrade(self);
        let mut state = lock(&self.state);
        let frame = PendingFrame::new(state.callback_delay, move |timestamp| {
            Self::fire(&weak, timestamp, &callback_ids);
        });

        let silent = state.last_telemetry.is_none_or(|last| {
            now.saturating_duration_since(last) > self.scheduler.config().silence_timeout
        });
        if silent {
            trace!(client = %self.client.id(), "no recent telemetry, parking frame");
            state.parked.push(frame);
        } else {
            drop(state);
            self.scheduler.enqueue(frame);
        }
    }

    fn fire(weak: &Weak<Self>, timestamp: u32, callback_ids: &[u32]) {
        let Some(this) = weak.upgrade() else { return };
        if this.is_destroyed() {
            return;
        }
        this.send_frame_done(timestamp, callback_ids);
    }

    // ── Outputs ──────────────────────────────────────────────────

    /// Retire each callback: done + delete-id in one send, flush, then
    /// destroy the callback resource without a destroy notification.
    pub fn send_frame_done(&self, timestamp: u32, callback_ids: &[u32]) {
        for &id in callback_ids {
            let records = frame_done_records(id, timestamp);
            if let Err(e) = self.client.send_events(&records) {
                warn!(client = %self.client.id(), callback = id, "failed to send frame done: {e}");
                continue;
            }
            if let Err(e) = self.client.flush() {
                warn!(client = %self.client.id(), "flush failed: {e}");
            }
            self.client.destroy_resource_silently(id);
        }
    }

    /// Tell the client it may reuse `buffer_id`.
    pub fn send_buffer_release(&self, buffer_id: u32) -> Result<(), FarviewError> {
        self.client.send_events(&buffer_release_record(buffer_id))?;
        self.client.flush()
    }

    // ── Telemetry channel ────────────────────────────────────────

    /// Consume telemetry messages from `rx` until it closes or this
    /// controller is destroyed. Malformed messages are logged and skipped.
    pub fn attach_telemetry(self: &Arc<Self>, mut rx: mpsc::Receiver<Bytes>) {
        let weak = Arc::downgrade(self);
        let client = self.client.id();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(this) = weak.upgrade() else { break };
                if this.is_destroyed() {
                    break;
                }
                if let Err(e) = this.on_telemetry(&message) {
                    warn!(%client, "dropping telemetry: {e}");
                }
            }
            debug!(%client, "telemetry channel closed");
        });

        if let Some(previous) = lock(&self.telemetry_pump).replace(handle) {
            previous.abort();
        }
    }

    /// Drop parked callbacks and close the telemetry channel. Queued
    /// batches that fire afterwards do nothing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.state).parked.clear();
        if let Some(pump) = lock(&self.telemetry_pump).take() {
            pump.abort();
        }
        debug!(client = %self.client.id(), "frame feedback destroyed");
    }
}

impl Drop for FrameFeedback {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.telemetry_pump).take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for FrameFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFeedback")
            .field("client", &self.client.id())
            .field("callback_delay", &self.callback_delay())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
