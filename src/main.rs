use anrwatch::{
    recording_handler_with_snapshot, Activity, DetectionMode, EventLoop, HangEvent, HangLog,
    Handler, HarnessConfig, Monitor, RuntimeTarget, Severity, WatchdogError,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Demonstrates the ANR watchdog: repeatedly stalls a main execution
/// context and reports every hang the watchdog detects.
#[derive(Parser, Debug)]
#[command(name = "anrwatch", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "anrwatch.toml")]
    config: PathBuf,

    /// Detection timeout in milliseconds (overrides config)
    #[arg(long, allow_negative_numbers = true)]
    timeout_ms: Option<i64>,

    /// Minimum severity for detection logging (overrides config)
    #[arg(long)]
    log_level: Option<Severity>,

    /// Detection mode: timer or probe (overrides config)
    #[arg(long)]
    mode: Option<DetectionMode>,

    /// Which context to stall
    #[arg(long, value_enum, default_value_t = DemoTarget::Tokio)]
    target: DemoTarget,

    /// Number of stalls to simulate
    #[arg(long, default_value_t = 3)]
    stalls: u32,

    /// Length of each stall in milliseconds
    #[arg(long, default_value_t = 1500)]
    stall_ms: u64,

    /// Responsive time between stalls in milliseconds
    #[arg(long, default_value_t = 500)]
    idle_ms: u64,

    /// Print detections as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the resolved config and exit
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (worker lifecycle, probe results)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors and the final summary
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DemoTarget {
    /// The current-thread tokio runtime driving this program
    Tokio,
    /// An event loop drained by a dedicated thread
    EventLoop,
}

/// Timings for one demo run.
#[derive(Debug, Clone, Copy)]
struct StallPlan {
    stalls: u32,
    stall: Duration,
    idle: Duration,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match HarnessConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("# resolved from {}", cli.config.display());
                print!("{rendered}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to render config");
                return ExitCode::FAILURE;
            }
        }
    }

    let plan = StallPlan {
        stalls: cli.stalls,
        stall: Duration::from_millis(cli.stall_ms),
        idle: Duration::from_millis(cli.idle_ms),
    };
    let log = Arc::new(HangLog::new(config.recorder.max_blocks));
    let activity = Activity::new();
    let handler = reporting_handler(Arc::clone(&log), activity.clone(), cli.json);

    tracing::info!(
        target_kind = ?cli.target,
        timeout_ms = config.watchdog.timeout_ms,
        mode = %config.watchdog.mode,
        stalls = plan.stalls,
        stall_ms = cli.stall_ms,
        "anrwatch demo starting"
    );

    let result = match cli.target {
        DemoTarget::Tokio => stall_runtime(config, plan, handler, activity).await,
        DemoTarget::EventLoop => {
            let stalled = move || stall_event_loop(config, plan, handler, activity);
            match tokio::task::spawn_blocking(stalled).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "event loop demo panicked");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "watchdog failed to start");
        return ExitCode::FAILURE;
    }

    let longest_ms = log.longest().map(|d| d.as_millis() as u64).unwrap_or(0);
    eprintln!(
        "{} hang(s) recorded, longest {}ms",
        log.len(),
        longest_ms
    );
    ExitCode::SUCCESS
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(config: &mut HarnessConfig, cli: &Cli) {
    if let Some(timeout_ms) = cli.timeout_ms {
        config.watchdog.timeout_ms = timeout_ms;
    }
    if let Some(level) = cli.log_level {
        config.watchdog.min_severity = level;
    }
    if let Some(mode) = cli.mode {
        config.watchdog.mode = mode;
    }
}

/// Record every detection, with what the stalled context was doing, and
/// print it to stdout.
fn reporting_handler(log: Arc<HangLog>, activity: Activity, json: bool) -> Handler {
    let record = recording_handler_with_snapshot(log, move |_| activity.snapshot());
    Arc::new(move |event: &HangEvent| {
        record(event);
        if json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize hang event"),
            }
        } else {
            println!(
                "hang detected: {} unresponsive for {}ms (check {}, {} mode)",
                event.context,
                event.elapsed_ms(),
                event.cycle,
                event.mode
            );
        }
    })
}

/// Block the runtime thread this future runs on.
async fn stall_runtime(
    config: HarnessConfig,
    plan: StallPlan,
    handler: Handler,
    activity: Activity,
) -> Result<(), WatchdogError> {
    let target = RuntimeTarget::new("tokio-main", tokio::runtime::Handle::current());
    let monitor = Monitor::with_config(target, config.watchdog);
    monitor.set_handler(handler).start()?;

    for stall in 1..=plan.stalls {
        tokio::time::sleep(plan.idle).await;
        tracing::info!(stall, "blocking the runtime thread");
        let _busy = activity.enter(stall_label(stall, plan.stall));
        // Deliberately synchronous: nothing else on this runtime can run.
        thread::sleep(plan.stall);
    }
    tokio::time::sleep(plan.idle).await;

    monitor.stop();
    Ok(())
}

fn stall_label(stall: u32, length: Duration) -> String {
    format!("stall {stall}: thread::sleep({}ms)", length.as_millis())
}

/// Run an event loop on the calling thread while a feeder posts long tasks.
fn stall_event_loop(
    config: HarnessConfig,
    plan: StallPlan,
    handler: Handler,
    activity: Activity,
) -> Result<(), WatchdogError> {
    let event_loop = EventLoop::new("main-loop");
    let handle = event_loop.handle();
    let monitor = Monitor::with_config(handle.clone(), config.watchdog);
    monitor.set_handler(handler).start()?;

    let feeder = thread::spawn(move || {
        for stall in 1..=plan.stalls {
            thread::sleep(plan.idle);
            let activity = activity.clone();
            handle.post(move || {
                tracing::info!(stall, "blocking the event loop");
                let _busy = activity.enter(stall_label(stall, plan.stall));
                thread::sleep(plan.stall);
            });
        }
        thread::sleep(plan.idle);
        handle.quit();
    });

    let ran = event_loop.run();
    tracing::debug!(tasks = ran, "event loop finished");
    if feeder.join().is_err() {
        tracing::warn!("feeder thread panicked");
    }

    monitor.stop();
    Ok(())
}
