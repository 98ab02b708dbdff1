//! ANR watchdog: detects when a designated main execution context stops
//! responding and reports each detection to a caller-supplied handler.
//!
//! ```no_run
//! use anrwatch::{EventLoop, Monitor, Severity};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new("main");
//! let monitor = Monitor::new(event_loop.handle());
//! monitor
//!     .set_timeout(Duration::from_millis(500))
//!     .set_log_level(Severity::Debug)
//!     .set_callback(|event| eprintln!("{} stalled for {:?}", event.context, event.elapsed))
//!     .start()?;
//! event_loop.run();
//! # Ok::<(), anrwatch::WatchdogError>(())
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod monitor;
pub mod recorder;
pub mod registry;
pub mod severity;
pub mod target;

pub use config::{HarnessConfig, MonitorConfig, RecorderConfig};
pub use error::{ConfigError, WatchdogError};
pub use event::{DetectionMode, HangEvent, Handler};
pub use event_loop::{EventLoop, EventLoopHandle};
pub use monitor::Monitor;
pub use recorder::{
    recording_handler, recording_handler_with_snapshot, Activity, ActivityGuard, HangLog,
    HangRecord, HangRecorder,
};
pub use severity::Severity;
pub use target::{NamedContext, RuntimeTarget, TargetContext, Task};
