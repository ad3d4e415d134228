//! Global frame-pacing tick.
//!
//! One scheduler drives every client's frame callbacks. Each tick
//! decrements the remaining delay of every pending batch by the tick
//! length and fires the batches that reach zero.
//!
//! ```text
//!   request_interval(d)
//!        │
//!        ├── |tick - d| > restart_threshold ──► restart timer now
//!        └── otherwise ──────────────────────► adopt at next tick boundary
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::lock;

/// Shortest tick the scheduler will run at.
pub const MIN_TICK: Duration = Duration::from_millis(1);

// ── PacingConfig ─────────────────────────────────────────────────

/// Pacing tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Tick length used before any client reports telemetry.
    pub initial_tick: Duration,
    /// Interval changes larger than this restart the timer immediately.
    pub restart_threshold: Duration,
    /// Without telemetry for this long, callbacks are parked.
    pub silence_timeout: Duration,
    /// Number of encoding samples in the rolling server-cost average.
    pub window: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            initial_tick: Duration::from_micros(16_667),
            restart_threshold: Duration::from_millis(500),
            silence_timeout: Duration::from_millis(1500),
            window: 60,
        }
    }
}

// ── PendingFrame ─────────────────────────────────────────────────

/// Receives the frame timestamp (ms since scheduler start) when fired.
pub type FrameCallback = Box<dyn FnOnce(u32) + Send>;

/// A batch of frame callbacks waiting out its delay.
pub struct PendingFrame {
    remaining: Duration,
    callback: FrameCallback,
}

impl PendingFrame {
    pub fn new(delay: Duration, callback: impl FnOnce(u32) + Send + 'static) -> Self {
        Self {
            remaining: delay,
            callback: Box::new(callback),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

impl std::fmt::Debug for PendingFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFrame")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

// ── FrameScheduler ───────────────────────────────────────────────

struct SchedulerState {
    tick: Duration,
    next_tick: Duration,
    queue: Vec<PendingFrame>,
}

struct SchedulerInner {
    config: PacingConfig,
    epoch: Instant,
    state: Mutex<SchedulerState>,
    interval_tx: watch::Sender<Duration>,
    running: Arc<AtomicBool>,
}

/// Shared handle to the pacing scheduler.
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Arc<SchedulerInner>,
}

impl FrameScheduler {
    pub fn new(config: PacingConfig) -> Self {
        let tick = config.initial_tick.max(MIN_TICK);
        let (interval_tx, _) = watch::channel(tick);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                epoch: Instant::now(),
                state: Mutex::new(SchedulerState {
                    tick,
                    next_tick: tick,
                    queue: Vec::new(),
                }),
                interval_tx,
                running: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.inner.config
    }

    /// Tick length currently in effect.
    pub fn tick_interval(&self) -> Duration {
        lock(&self.inner.state).tick
    }

    /// Tick length adopted at the next tick boundary.
    pub fn pending_interval(&self) -> Duration {
        lock(&self.inner.state).next_tick
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }

    /// Milliseconds since the scheduler was created, wrapping at `u32`.
    pub fn timestamp_at(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.inner.epoch).as_millis() as u32
    }

    // ── Queue ────────────────────────────────────────────────────

    pub fn enqueue(&self, frame: PendingFrame) {
        trace!(remaining = ?frame.remaining, "frame batch queued");
        lock(&self.inner.state).queue.push(frame);
    }

    pub fn enqueue_all(&self, frames: impl IntoIterator<Item = PendingFrame>) {
        lock(&self.inner.state).queue.extend(frames);
    }

    // ── Interval ─────────────────────────────────────────────────

    /// Ask for a new tick length.
    ///
    /// A change larger than the restart threshold restarts the timer at
    /// once; smaller changes wait for the next tick boundary.
    pub fn request_interval(&self, interval: Duration) {
        let interval = interval.max(MIN_TICK);
        let mut state = lock(&self.inner.state);
        state.next_tick = interval;
        if state.tick.abs_diff(interval) > self.inner.config.restart_threshold {
            debug!(from = ?state.tick, to = ?interval, "restarting pacing timer");
            state.tick = interval;
            drop(state);
            self.inner.interval_tx.send_replace(interval);
        }
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Run one tick now. Returns the number of batches fired.
    pub fn tick(&self) -> usize {
        self.tick_at(Instant::now())
    }

    /// Run one tick as of `now`.
    ///
    /// Callbacks run after the queue lock is released, so they may
    /// enqueue new frames.
    pub fn tick_at(&self, now: Instant) -> usize {
        let (fired, adopted) = {
            let mut state = lock(&self.inner.state);
            let tick = state.tick;

            let mut fired = Vec::new();
            let mut retained = Vec::with_capacity(state.queue.len());
            for mut frame in state.queue.drain(..) {
                frame.remaining = frame.remaining.saturating_sub(tick);
                if frame.remaining.is_zero() {
                    fired.push(frame.callback);
                } else {
                    retained.push(frame);
                }
            }
            state.queue = retained;

            let adopted = (state.next_tick != state.tick).then(|| {
                state.tick = state.next_tick;
                state.next_tick
            });
            (fired, adopted)
        };

        if let Some(interval) = adopted {
            trace!(?interval, "adopting tick interval");
            self.inner.interval_tx.send_replace(interval);
        }

        let count = fired.len();
        if count > 0 {
            let timestamp = self.timestamp_at(now);
            for callback in fired {
                callback(timestamp);
            }
        }
        count
    }

    // ── Run loop ─────────────────────────────────────────────────

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.running)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Drive ticks until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
        let mut interval_rx = self.inner.interval_tx.subscribe();
        let mut period = *interval_rx.borrow_and_update();
        let mut timer = Self::timer(period);
        info!(?period, "frame scheduler started");

        while self.is_running() {
            tokio::select! {
                _ = timer.tick() => {
                    self.tick();
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *interval_rx.borrow_and_update();
                    if next != period {
                        period = next;
                        timer = Self::timer(period);
                    }
                }
            }
        }

        info!("frame scheduler stopped");
    }

    fn timer(period: Duration) -> tokio::time::Interval {
        let mut timer =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period.max(MIN_TICK));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("tick", &self.tick_interval())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
