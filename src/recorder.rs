/// Hang history kept for later inspection.
///
/// The watchdog itself never depends on this module; a handler built with
/// `recording_handler` pushes each detection into any `HangRecorder`.
use crate::config::DEFAULT_MAX_BLOCKS;
use crate::event::{HangEvent, Handler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One recorded stall of the target context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HangRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub context: String,
    /// Stack snapshot of the stalled context, when the reporter has one.
    pub stack_trace: Option<String>,
}

impl From<&HangEvent> for HangRecord {
    fn from(event: &HangEvent) -> Self {
        Self {
            timestamp: event.detected_at,
            duration: event.elapsed,
            context: event.context.clone(),
            stack_trace: None,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
}

/// Sink for hang records.
pub trait HangRecorder: Send + Sync {
    fn record(&self, record: HangRecord);
}

/// Wrap a recorder as a watchdog handler. Records carry no stack snapshot;
/// see `recording_handler_with_snapshot`.
pub fn recording_handler(recorder: Arc<dyn HangRecorder>) -> Handler {
    Arc::new(move |event: &HangEvent| recorder.record(HangRecord::from(event)))
}

/// Like `recording_handler`, but asks `snapshot` for the stalled context's
/// stack (or whatever it was busy with) at detection time.
pub fn recording_handler_with_snapshot<F>(recorder: Arc<dyn HangRecorder>, snapshot: F) -> Handler
where
    F: Fn(&HangEvent) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(move |event: &HangEvent| {
        let mut record = HangRecord::from(event);
        record.stack_trace = snapshot(event);
        recorder.record(record);
    })
}

/// What a watched context is currently doing.
///
/// The watchdog thread cannot walk another thread's stack, so the watched
/// context publishes a label around long work and the recorder snapshots it.
#[derive(Debug, Clone, Default)]
pub struct Activity {
    current: Arc<Mutex<Option<String>>>,
}

/// Clears the activity label when dropped.
#[must_use = "the label is cleared as soon as the guard is dropped"]
pub struct ActivityGuard {
    current: Arc<Mutex<Option<String>>>,
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `label` until the returned guard is dropped.
    pub fn enter(&self, label: impl Into<String>) -> ActivityGuard {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(label.into());
        ActivityGuard {
            current: Arc::clone(&self.current),
        }
    }

    pub fn snapshot(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

struct Inner {
    max_blocks: usize,
    /// Most recent first.
    blocks: VecDeque<HangRecord>,
}

impl Inner {
    fn trim(&mut self) {
        self.blocks.truncate(self.max_blocks);
    }
}

/// Bounded, most-recent-first history of hang records.
pub struct HangLog {
    inner: Mutex<Inner>,
}

impl HangLog {
    /// Create a log holding at most `max_blocks` records (at least one).
    pub fn new(max_blocks: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                max_blocks: max_blocks.max(1),
                blocks: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_blocks(&self) -> usize {
        self.lock().max_blocks
    }

    /// Change the capacity, dropping the oldest records if it shrank.
    pub fn set_max_blocks(&self, max_blocks: usize) {
        let mut inner = self.lock();
        inner.max_blocks = max_blocks.max(1);
        inner.trim();
    }

    /// Record a stall observed now.
    pub fn record_block(&self, duration: Duration, context: &str, stack_trace: Option<String>) {
        self.record(HangRecord {
            timestamp: Utc::now(),
            duration,
            context: context.to_string(),
            stack_trace,
        });
    }

    pub fn recent(&self) -> Vec<HangRecord> {
        self.lock().blocks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().blocks.is_empty()
    }

    pub fn clear(&self) {
        self.lock().blocks.clear();
    }

    /// Longest recorded stall, if any.
    pub fn longest(&self) -> Option<Duration> {
        self.lock().blocks.iter().map(|b| b.duration).max()
    }
}

impl Default for HangLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCKS)
    }
}

impl HangRecorder for HangLog {
    fn record(&self, record: HangRecord) {
        let mut inner = self.lock();
        inner.blocks.push_front(record);
        inner.trim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DetectionMode;

    #[test]
    fn test_record_block_stores_fields() {
        let log = HangLog::default();
        log.record_block(Duration::from_millis(1000), "main", Some("frame 0".to_string()));

        let blocks = log.recent();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].duration, Duration::from_millis(1000));
        assert_eq!(blocks[0].context, "main");
        assert_eq!(blocks[0].stack_trace.as_deref(), Some("frame 0"));
    }

    #[test]
    fn test_most_recent_first() {
        let log = HangLog::default();
        for i in 1..=5 {
            log.record_block(Duration::from_millis(i * 100), "main", Some(format!("trace {i}")));
        }
        let blocks = log.recent();
        assert_eq!(blocks.len(), 5);
        assert_eq!(blocks[0].stack_trace.as_deref(), Some("trace 5"));
        assert_eq!(blocks[4].stack_trace.as_deref(), Some("trace 1"));
        for pair in blocks.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = HangLog::new(3);
        for i in 1..=5 {
            log.record_block(Duration::from_millis(i), "main", Some(format!("trace {i}")));
        }
        let blocks = log.recent();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].stack_trace.as_deref(), Some("trace 5"));
        assert_eq!(blocks[2].stack_trace.as_deref(), Some("trace 3"));
    }

    #[test]
    fn test_shrinking_capacity_trims_immediately() {
        let log = HangLog::default();
        for i in 0..10 {
            log.record_block(Duration::from_millis(i), "main", None);
        }
        log.set_max_blocks(4);
        assert_eq!(log.len(), 4);
        assert_eq!(log.max_blocks(), 4);
    }

    #[test]
    fn test_capacity_coerced_to_at_least_one() {
        let log = HangLog::new(0);
        assert_eq!(log.max_blocks(), 1);
        log.set_max_blocks(0);
        assert_eq!(log.max_blocks(), 1);
        log.record_block(Duration::ZERO, "main", None);
        log.record_block(Duration::ZERO, "main", None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_clear_and_longest() {
        let log = HangLog::default();
        assert!(log.longest().is_none());
        log.record_block(Duration::from_millis(300), "main", None);
        log.record_block(Duration::from_millis(900), "main", None);
        log.record_block(Duration::from_millis(100), "main", None);
        assert_eq!(log.longest(), Some(Duration::from_millis(900)));

        log.clear();
        assert!(log.is_empty());
    }

    fn sample_event() -> HangEvent {
        HangEvent {
            context: "main".to_string(),
            elapsed: Duration::from_millis(450),
            cycle: 2,
            mode: DetectionMode::Probe,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_handler_stores_stack_trace() {
        let log = Arc::new(HangLog::default());
        let handler = recording_handler_with_snapshot(log.clone(), |event| {
            Some(format!("{} at check {}", event.context, event.cycle))
        });
        handler(&sample_event());

        let blocks = log.recent();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].stack_trace.as_deref(), Some("main at check 2"));
        assert_eq!(blocks[0].duration, Duration::from_millis(450));
    }

    #[test]
    fn test_activity_snapshot_follows_guard() {
        let activity = Activity::new();
        assert!(activity.snapshot().is_none());

        let guard = activity.enter("decoding thumbnail");
        assert_eq!(activity.snapshot().as_deref(), Some("decoding thumbnail"));
        drop(guard);
        assert!(activity.snapshot().is_none());
    }

    #[test]
    fn test_activity_feeds_snapshot_handler() {
        let log = Arc::new(HangLog::default());
        let activity = Activity::new();
        let seen = activity.clone();
        let handler = recording_handler_with_snapshot(log.clone(), move |_| seen.snapshot());

        let _busy = activity.enter("sync layout pass");
        handler(&sample_event());

        assert_eq!(
            log.recent()[0].stack_trace.as_deref(),
            Some("sync layout pass")
        );
    }

    #[test]
    fn test_recording_handler_feeds_log() {
        let log = Arc::new(HangLog::default());
        let handler = recording_handler(log.clone());
        let event = HangEvent {
            context: "main".to_string(),
            elapsed: Duration::from_millis(700),
            cycle: 1,
            mode: DetectionMode::Timer,
            detected_at: Utc::now(),
        };
        handler(&event);

        let blocks = log.recent();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].duration, Duration::from_millis(700));
        assert_eq!(blocks[0].timestamp, event.detected_at);
        assert!(blocks[0].stack_trace.is_none());
    }
}
