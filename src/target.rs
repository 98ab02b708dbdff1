/// Target contexts the watchdog can observe.
///
/// A target is anything that runs queued work on a designated execution
/// context. Probe mode posts a no-op task and measures whether it runs in time.
use std::sync::Arc;

/// Unit of work posted onto a target context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context whose responsiveness is being watched.
pub trait TargetContext: Send + Sync {
    /// Human-readable name, reported in every `HangEvent`.
    fn name(&self) -> &str;

    /// Queue `task` to run on the context.
    ///
    /// Returns `false` if the context can no longer accept work (its queue
    /// was shut down). A context that accepts a task but later discards it
    /// must drop it unrun rather than leak it. Must not block.
    fn post(&self, task: Task) -> bool;
}

impl<T: TargetContext + ?Sized> TargetContext for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn post(&self, task: Task) -> bool {
        (**self).post(task)
    }
}

/// A context known only by name. It accepts no tasks, so it is only useful
/// with timer-mode detection.
#[derive(Debug, Clone)]
pub struct NamedContext {
    name: String,
}

impl NamedContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TargetContext for NamedContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, _task: Task) -> bool {
        false
    }
}

/// A tokio runtime observed through its handle.
///
/// On a current-thread runtime a blocking call inside any task keeps the
/// probe from running, which is exactly what probe mode detects. On a
/// multi-thread runtime the probe only stalls when every worker is blocked.
#[derive(Debug, Clone)]
pub struct RuntimeTarget {
    name: String,
    handle: tokio::runtime::Handle,
}

impl RuntimeTarget {
    pub fn new(name: impl Into<String>, handle: tokio::runtime::Handle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// Observe the runtime the caller is currently running on.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn current(name: impl Into<String>) -> Option<Self> {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| Self::new(name, handle))
    }
}

impl TargetContext for RuntimeTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, task: Task) -> bool {
        // A shut-down runtime drops the task unrun; the watchdog sees that
        // through the task's drop, not through this return value.
        self.handle.spawn(async move { task() });
        true
    }
}
