/// Process-wide monitor slot for callers that want one shared watchdog.
///
/// Prefer owning a `Monitor` directly and passing it where it is needed.
/// This accessor exists for code that expects the fluent
/// `initialize(ctx).set_timeout(..).start()` style.
use crate::monitor::Monitor;
use crate::target::TargetContext;
use std::sync::{Arc, Mutex, PoisonError};

static MONITOR: Mutex<Option<Arc<Monitor>>> = Mutex::new(None);

/// Return the process-wide monitor, creating it bound to `target` with
/// default settings on first use.
///
/// Later calls return the existing instance unchanged; their `target` is
/// dropped and never rebinds the monitor.
pub fn initialize(target: impl TargetContext + 'static) -> Arc<Monitor> {
    let mut slot = MONITOR.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(existing) => {
            tracing::debug!(
                context = %existing.target_name(),
                ignored = %target.name(),
                "watchdog already initialized"
            );
            Arc::clone(existing)
        }
        None => {
            tracing::debug!(context = %target.name(), "initializing watchdog");
            let monitor = Arc::new(Monitor::new(target));
            *slot = Some(Arc::clone(&monitor));
            monitor
        }
    }
}

/// The process-wide monitor, if `initialize` has been called.
pub fn get() -> Option<Arc<Monitor>> {
    MONITOR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Stop and discard the process-wide monitor so the next `initialize`
/// creates a fresh one. Returns whether a monitor was present.
pub fn reset() -> bool {
    let previous = MONITOR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match previous {
        Some(monitor) => {
            monitor.stop();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIMEOUT_MS;
    use crate::severity::Severity;
    use crate::target::NamedContext;
    use serial_test::serial;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_initialize_returns_same_instance() {
        reset();
        let a = initialize(NamedContext::new("main"));
        let b = initialize(NamedContext::new("main"));
        let c = initialize(NamedContext::new("main"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        reset();
    }

    #[test]
    #[serial]
    fn test_second_initialize_does_not_rebind_or_reset() {
        reset();
        let first = initialize(NamedContext::new("main"));
        first.set_timeout_ms(123).set_log_level(Severity::Error);

        let second = initialize(NamedContext::new("other"));
        assert_eq!(second.target_name(), "main");
        assert_eq!(second.timeout_ms(), 123);
        assert_eq!(second.log_level(), Severity::Error);
        reset();
    }

    #[test]
    #[serial]
    fn test_initialize_uses_defaults() {
        reset();
        let monitor = initialize(NamedContext::new("main"));
        assert_eq!(monitor.timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert_eq!(monitor.log_level(), Severity::Info);
        assert!(!monitor.is_running());
        reset();
    }

    #[test]
    #[serial]
    fn test_get_and_reset() {
        reset();
        assert!(get().is_none());
        assert!(!reset());

        let monitor = initialize(NamedContext::new("main"));
        assert!(Arc::ptr_eq(&get().unwrap(), &monitor));

        monitor.start().unwrap();
        assert!(reset());
        assert!(!monitor.is_running());
        assert!(get().is_none());

        let fresh = initialize(NamedContext::new("main"));
        assert!(!Arc::ptr_eq(&fresh, &monitor));
        reset();
    }

    #[test]
    #[serial]
    fn test_concurrent_initialize_creates_one_monitor() {
        reset();
        let threads: Vec<_> = (0..10)
            .map(|i| thread::spawn(move || initialize(NamedContext::new(format!("ctx-{i}")))))
            .collect();
        let monitors: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        for m in &monitors[1..] {
            assert!(Arc::ptr_eq(&monitors[0], m));
        }
        reset();
    }

    #[test]
    #[serial]
    fn test_fluent_chain_through_registry() {
        reset();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);

        let monitor = initialize(NamedContext::new("main"));
        monitor
            .set_timeout(Duration::from_millis(100))
            .set_log_level(Severity::Debug)
            .set_callback(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .start()
            .unwrap();

        thread::sleep(Duration::from_millis(250));
        monitor.stop();
        assert!(count.load(Ordering::SeqCst) >= 2);
        reset();
    }
}
