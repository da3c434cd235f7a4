// Logging System for Magpie
//
// This module provides a unified logging interface for the magpie runtime.
// It's built on top of the `tracing` ecosystem, which offers structured
// logging with per-target filtering — useful here because the scheduling
// engines log at trace volume while embedding applications usually only
// want their own output.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use magpie::logging;
//
// // Initialize with default settings (INFO level, console output)
// logging::init_default();
//
// // Or initialize with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// ## Development Environment
//
// `init_development()` raises the engine targets to TRACE so every queue
// insertion, wake-up and dispatch decision is visible.
//
// ## Production Environment
//
// `init_production()` uses JSON output without file/line information.
//
// ## Using Log Macros
//
// ```rust
// use magpie::logging;
//
// logging::init_default();
//
// logging::info!("runtime started");
// logging::debug!("submitting batch {}", batch_id);
//
// // Or the scheduling-focused macros
// magpie::log_scheduler!("parallel-pool", "work_queued", pending = 10);
// magpie::log_timer!("main-timer", "event_posted", delay_ms = 250);
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the magpie logging system.
///
/// # Examples
///
/// ```rust
/// use magpie::logging::LogConfig;
/// use tracing::Level;
///
/// let custom_config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("magpie=debug,magpie::pool=trace".to_string()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration.
///
/// Sets up the global tracing subscriber. Safe to call multiple times; only
/// the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

        // Add any target-specific filters if provided
        if let Some(filters) = config.target_filters {
            for filter in filters.split(',') {
                if let Ok(directive) = filter.parse() {
                    env_filter = env_filter.add_directive(directive);
                }
            }
        }

        let fmt_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let registry = tracing_subscriber::registry().with(env_filter);

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(registry.with(fmt::layer().json().flatten_event(true)))
        } else {
            Box::new(registry.with(fmt_layer))
        };

        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Create a boxed writer appending to a log file, creating it if absent.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output.
///
/// Console output respects the ANSI color setting, while file output is
/// always plain.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();

        let file_layer = fmt::layer()
            .with_ansi(false) // No ANSI colors in files
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// Initialize default logging: INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development.
///
/// DEBUG level for magpie with the pool and timer engines raised to TRACE,
/// colorized console output with file/line information.
pub fn init_development() {
    let config = LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("magpie=debug,magpie::pool=trace,magpie::timer=trace".to_string()),
    };
    init(config);
}

/// Initialize logging optimized for production: INFO level, JSON output,
/// no file/line information.
pub fn init_production() {
    let config = LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    };
    init(config);
}

/// Initialize logging for tests: WARN level, compact plain output.
pub fn init_test() {
    let config = LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    };
    init(config);
}

/// Log scheduling events.
///
/// # Examples
///
/// ```rust
/// use magpie::log_scheduler;
///
/// log_scheduler!("parallel-pool", "worker_created");
/// log_scheduler!("parallel-pool", "work_queued", pending = 10, realtime = false);
/// ```
#[macro_export]
macro_rules! log_scheduler {
    ($pool:expr, $event:expr) => {
        tracing::debug!(pool = $pool, event = $event);
    };
    ($pool:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(pool = $pool, event = $event, $($fields)*);
    };
}

/// Log timed-event queue events.
///
/// # Examples
///
/// ```rust
/// use magpie::log_timer;
///
/// log_timer!("main-timer", "event_posted");
/// log_timer!("main-timer", "event_cancelled", id = 17);
/// ```
#[macro_export]
macro_rules! log_timer {
    ($queue:expr, $event:expr) => {
        tracing::debug!(queue = $queue, event = $event);
    };
    ($queue:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(queue = $queue, event = $event, $($fields)*);
    };
}

/// Log error events.
///
/// # Examples
///
/// ```rust
/// use magpie::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
/// log_error!(error);
/// log_error!(error, component = "pool", operation = "dispatch");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

/// Get the current tracing dispatcher.
///
/// Useful when spawning threads that should log through a non-global
/// dispatcher.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
