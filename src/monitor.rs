/// Watchdog monitor: configuration, start/stop lifecycle and the check loop.
///
/// A `Monitor` owns at most one background thread at a time. The thread
/// waits for the configured timeout, decides whether the target context is
/// unresponsive, and hands a `HangEvent` to the registered handler. Setters
/// may be called from any thread at any time and take effect on the next
/// cycle; `stop` wakes the thread immediately.
use crate::config::{clamp_timeout, MonitorConfig};
use crate::error::WatchdogError;
use crate::event::{DetectionMode, HangEvent, Handler};
use crate::severity::Severity;
use crate::target::TargetContext;
use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Tracing target for detection records.
pub const LOG_TAG: &str = "Watchdog";

/// Name given to the background check thread.
pub const WORKER_THREAD_NAME: &str = "anr-watchdog";

/// Settings shared between caller threads and the worker.
struct Shared {
    timeout_ms: AtomicI64,
    min_severity: AtomicU8,
    probe_mode: AtomicBool,
    handler: RwLock<Option<Handler>>,
    live_workers: AtomicUsize,
}

impl Shared {
    fn new(config: MonitorConfig) -> Self {
        Self {
            timeout_ms: AtomicI64::new(config.timeout_ms),
            min_severity: AtomicU8::new(config.min_severity.as_u8()),
            probe_mode: AtomicBool::new(config.mode == DetectionMode::Probe),
            handler: RwLock::new(None),
            live_workers: AtomicUsize::new(0),
        }
    }

    fn timeout_ms(&self) -> i64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    fn min_severity(&self) -> Severity {
        Severity::from_u8(self.min_severity.load(Ordering::Relaxed))
    }

    fn mode(&self) -> DetectionMode {
        if self.probe_mode.load(Ordering::Relaxed) {
            DetectionMode::Probe
        } else {
            DetectionMode::Timer
        }
    }

    fn handler(&self) -> Option<Handler> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_handler(&self, handler: Option<Handler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

enum Signal {
    Stop,
    Ack(u64),
    /// The target discarded a check task without running it.
    Dropped(u64),
}

/// Watches one target context from a dedicated background thread.
pub struct Monitor {
    target: Arc<dyn TargetContext>,
    shared: Arc<Shared>,
    /// Stop channel of the running worker; `None` while not running.
    worker: Mutex<Option<Sender<Signal>>>,
}

impl Monitor {
    /// Create a monitor with default settings: 5000ms timeout, `Info`
    /// minimum severity, timer mode, no handler.
    pub fn new(target: impl TargetContext + 'static) -> Self {
        Self::with_config(target, MonitorConfig::default())
    }

    pub fn with_config(target: impl TargetContext + 'static, config: MonitorConfig) -> Self {
        Self {
            target: Arc::new(target),
            shared: Arc::new(Shared::new(config)),
            worker: Mutex::new(None),
        }
    }

    /// Store the timeout verbatim, in milliseconds. Zero and negative values
    /// are accepted and make the worker check again without waiting.
    pub fn set_timeout_ms(&self, timeout_ms: i64) -> &Self {
        self.shared.timeout_ms.store(timeout_ms, Ordering::Relaxed);
        self
    }

    pub fn set_timeout(&self, timeout: Duration) -> &Self {
        let ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self.set_timeout_ms(ms)
    }

    /// Set the minimum severity. Detections are logged only when this is
    /// `Debug` or lower; the handler fires regardless.
    pub fn set_log_level(&self, level: Severity) -> &Self {
        self.shared
            .min_severity
            .store(level.as_u8(), Ordering::Relaxed);
        self
    }

    pub fn set_mode(&self, mode: DetectionMode) -> &Self {
        self.shared
            .probe_mode
            .store(mode == DetectionMode::Probe, Ordering::Relaxed);
        self
    }

    /// Replace the handler. Only the most recent handler is ever invoked.
    pub fn set_callback<F>(&self, callback: F) -> &Self
    where
        F: Fn(&HangEvent) + Send + Sync + 'static,
    {
        self.set_handler(Arc::new(callback))
    }

    pub fn set_handler(&self, handler: Handler) -> &Self {
        self.shared.replace_handler(Some(handler));
        self
    }

    pub fn clear_callback(&self) -> &Self {
        self.shared.replace_handler(None);
        self
    }

    pub fn timeout_ms(&self) -> i64 {
        self.shared.timeout_ms()
    }

    /// Effective wait between checks; negative timeouts clamp to zero.
    pub fn timeout(&self) -> Duration {
        clamp_timeout(self.shared.timeout_ms())
    }

    pub fn log_level(&self) -> Severity {
        self.shared.min_severity()
    }

    pub fn mode(&self) -> DetectionMode {
        self.shared.mode()
    }

    pub fn has_callback(&self) -> bool {
        self.shared.handler().is_some()
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> MonitorConfig {
        MonitorConfig {
            timeout_ms: self.timeout_ms(),
            min_severity: self.log_level(),
            mode: self.mode(),
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Number of worker threads that have not exited yet. Briefly exceeds
    /// one only while a stopped worker is still unwinding after a restart.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::SeqCst)
    }

    /// Spawn the check thread. Calling `start` while running is a no-op.
    pub fn start(&self) -> Result<&Self, WatchdogError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            tracing::debug!(context = %self.target.name(), "watchdog already running");
            return Ok(self);
        }

        let (tx, rx) = mpsc::channel();
        let check = Worker {
            target: Arc::clone(&self.target),
            shared: Arc::clone(&self.shared),
            signals: rx,
            acks: tx.clone(),
            cycle: 0,
            next_probe: 0,
        };

        self.shared.live_workers.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || check.run());
        if let Err(e) = spawned {
            self.shared.live_workers.fetch_sub(1, Ordering::SeqCst);
            return Err(WatchdogError::Spawn { source: e });
        }

        *worker = Some(tx);
        tracing::info!(
            context = %self.target.name(),
            timeout_ms = self.timeout_ms(),
            mode = %self.mode(),
            "watchdog started"
        );
        Ok(self)
    }

    /// Signal the worker to exit. Does not wait for it. Calling `stop`
    /// while not running is a no-op.
    pub fn stop(&self) {
        let Some(signals) = lock(&self.worker).take() else {
            return;
        };
        // The worker may already be gone; nothing to do then.
        let _ = signals.send(Signal::Stop);
        tracing::info!(context = %self.target.name(), "watchdog stopped");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("target", &self.target.name())
            .field("config", &self.config())
            .field("has_callback", &self.has_callback())
            .field("running", &self.is_running())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether a detection at `min_severity` produces a log record.
fn logs_detection(min_severity: Severity) -> bool {
    min_severity <= Severity::Debug
}

enum Wake {
    Stop,
    Deadline,
    Ack(u64),
    Dropped(u64),
}

/// An outstanding probe posted to the target.
struct Probe {
    seq: u64,
    posted_at: Instant,
    reported: bool,
}

/// Answer carried by a posted check task.
///
/// Running the task sends `Ack`. A target that discards the task instead
/// (shut-down runtime, exited event loop) drops it unrun, which sends
/// `Dropped` so the worker stops waiting on it.
struct CheckReply {
    seq: u64,
    acks: Sender<Signal>,
    answered: bool,
}

impl CheckReply {
    fn answer(mut self) {
        self.answered = true;
        let _ = self.acks.send(Signal::Ack(self.seq));
    }
}

impl Drop for CheckReply {
    fn drop(&mut self) {
        if !self.answered {
            let _ = self.acks.send(Signal::Dropped(self.seq));
        }
    }
}

/// Decrements the live-worker count when the worker exits, including by panic.
struct LiveGuard(Arc<Shared>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Worker {
    target: Arc<dyn TargetContext>,
    shared: Arc<Shared>,
    signals: Receiver<Signal>,
    acks: Sender<Signal>,
    cycle: u64,
    next_probe: u64,
}

impl Worker {
    fn run(mut self) {
        let _live = LiveGuard(Arc::clone(&self.shared));
        tracing::debug!(context = %self.target.name(), "watchdog thread running");

        let mut pending: Option<Probe> = None;
        loop {
            let started = Instant::now();
            // Timeouts too large to represent as an Instant wait forever.
            let deadline = started.checked_add(clamp_timeout(self.shared.timeout_ms()));
            let mode = self.shared.mode();

            if mode == DetectionMode::Probe && pending.is_none() {
                pending = self.post_probe();
            }

            loop {
                match self.wait_until(deadline) {
                    Wake::Stop => {
                        tracing::debug!(context = %self.target.name(), "watchdog thread exiting");
                        return;
                    }
                    Wake::Deadline => break,
                    Wake::Ack(seq) => {
                        if pending.as_ref().is_some_and(|p| p.seq == seq) {
                            if let Some(probe) = pending.take() {
                                self.on_responsive(&probe);
                            }
                        }
                    }
                    Wake::Dropped(seq) => {
                        if pending.as_ref().is_some_and(|p| p.seq == seq) {
                            pending = None;
                            tracing::debug!(
                                context = %self.target.name(),
                                "target context dropped the check task, skipping check"
                            );
                        }
                    }
                }
            }

            self.cycle += 1;
            match mode {
                DetectionMode::Timer => self.dispatch(started.elapsed(), mode),
                DetectionMode::Probe => match pending.as_mut() {
                    Some(probe) => {
                        probe.reported = true;
                        let elapsed = probe.posted_at.elapsed();
                        self.dispatch(elapsed, mode);
                    }
                    None => {
                        tracing::trace!(
                            context = %self.target.name(),
                            cycle = self.cycle,
                            "target responsive"
                        );
                    }
                },
            }
        }
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Wake {
        let received = match deadline {
            Some(deadline) => self
                .signals
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self
                .signals
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => Wake::Stop,
            Ok(Signal::Ack(seq)) => Wake::Ack(seq),
            Ok(Signal::Dropped(seq)) => Wake::Dropped(seq),
            Err(RecvTimeoutError::Timeout) => Wake::Deadline,
        }
    }

    fn post_probe(&mut self) -> Option<Probe> {
        self.next_probe += 1;
        let seq = self.next_probe;
        let reply = CheckReply {
            seq,
            acks: self.acks.clone(),
            answered: false,
        };
        let posted_at = Instant::now();

        let accepted = self.target.post(Box::new(move || reply.answer()));
        if !accepted {
            tracing::debug!(
                context = %self.target.name(),
                "target context rejected probe, skipping check"
            );
            return None;
        }

        Some(Probe {
            seq,
            posted_at,
            reported: false,
        })
    }

    fn on_responsive(&self, probe: &Probe) {
        if probe.reported && self.shared.min_severity() <= Severity::Info {
            tracing::info!(
                target: LOG_TAG,
                context = %self.target.name(),
                stalled_ms = probe.posted_at.elapsed().as_millis() as u64,
                "target context responsive again"
            );
        }
    }

    fn dispatch(&self, elapsed: Duration, mode: DetectionMode) {
        let event = HangEvent {
            context: self.target.name().to_string(),
            elapsed,
            cycle: self.cycle,
            mode,
            detected_at: Utc::now(),
        };

        if let Some(handler) = self.shared.handler() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                tracing::warn!(
                    target: LOG_TAG,
                    context = %event.context,
                    cycle = event.cycle,
                    panic = %panic_message(payload.as_ref()),
                    "hang handler panicked, watchdog keeps running"
                );
            }
        }

        if logs_detection(self.shared.min_severity()) {
            tracing::debug!(
                target: LOG_TAG,
                context = %event.context,
                elapsed_ms = event.elapsed.as_millis() as u64,
                cycle = event.cycle,
                mode = %event.mode,
                "hang detected"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
