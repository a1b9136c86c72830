//! Logging infrastructure - structured tracing for the allocator, bridge and host
//!
//! Design: every event goes through a small helper with a fixed target
//! (`allocator`, `bridge`, `host`) so filters such as
//! `allocator=trace,host=info` work without knowing module paths. When no
//! subscriber is installed the helpers cost a level check.

use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::{debug, error, info, trace, warn, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Set once the first subscriber is installed; later calls are no-ops
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// How allocator, bridge and host events are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading a single script run by eye
    Pretty,
    /// One line per event; the default for embedding hosts
    Compact,
    /// One JSON object per event, fields such as `size` and `ptr` kept typed
    Json,
}

/// Where events are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// `<directory>/<prefix>.YYYY-MM-DD`, rolled daily
    File { directory: String, prefix: String },
}

/// Subscriber settings for an embedding application
///
/// The level applies to all three targets. `filter` narrows it per target,
/// which is how allocator tracing is usually switched on: allocation events
/// fire on every runtime allocation and are only emitted at `trace`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span enter/exit events as well
    pub span_events: bool,
    /// Directives appended after the level, e.g. `"allocator=trace,host=info"`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }

    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_output(self, output: LogOutput) -> Self {
        Self { output, ..self }
    }

    pub fn with_span_events(self, span_events: bool) -> Self {
        Self { span_events, ..self }
    }

    /// Per-target directives, e.g. `"allocator=trace"` to watch arena traffic
    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    /// Read `SCRIPTBRIDGE_LOG_*` overrides on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // SCRIPTBRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("SCRIPTBRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // SCRIPTBRIDGE_LOG_FORMAT: pretty, compact, json
        if let Ok(format) = std::env::var("SCRIPTBRIDGE_LOG_FORMAT") {
            config.format = parse_format(&format).unwrap_or(LogFormat::Compact);
        }

        // SCRIPTBRIDGE_LOG_FILE: path whose parent is the log directory
        if let Ok(path) = std::env::var("SCRIPTBRIDGE_LOG_FILE") {
            config.output = file_output(Path::new(&path));
        }

        config.span_events = std::env::var("SCRIPTBRIDGE_LOG_SPANS").is_ok();
        config
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self::default().with_level(Level::ERROR)
    }

    /// Everything, including per-block allocator traffic
    pub fn verbose() -> Self {
        Self::default()
            .with_level(Level::TRACE)
            .with_span_events(true)
            .with_filter("allocator=trace,bridge=trace,host=trace")
    }
}

fn parse_level(value: &str) -> Option<Level> {
    match value.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn parse_format(value: &str) -> Option<LogFormat> {
    match value.to_lowercase().as_str() {
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

fn file_output(path: &Path) -> LogOutput {
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scriptbridge.log".to_string());

    LogOutput::File {
        directory: directory.to_string_lossy().into_owned(),
        prefix,
    }
}

/// Install the process-wide subscriber for allocator, bridge and host events
///
/// Only the first call installs a subscriber; later calls return `None`.
/// A subscriber installed by someone else is left alone. The returned guard
/// flushes the non-blocking writer on drop and must be kept alive.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        guard = install(config);
    });
    guard
}

/// Initialize from `SCRIPTBRIDGE_LOG_*` environment variables
pub fn init() -> Option<WorkerGuard> {
    init_logging(LogConfig::from_env())
}

/// Whether a subscriber was installed through this module
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn install(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);
    let spans = span_events_config(config.span_events);

    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .pretty()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .compact()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(spans)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .ok()
        .map(|_| guard)
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(""))
        .add_directive(config.level.into());

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|directive| !directive.trim().is_empty())
            .fold(base_filter, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Allocator events
// ============================================================================

/// Log a block handed out by an arena or heap source
#[inline]
pub fn log_allocation(size: usize, ptr: *const u8, reused: bool) {
    trace!(target: "allocator", size, ptr = ?ptr, reused, "allocated block");
}

/// Log a block returned to its source
#[inline]
pub fn log_deallocation(size: usize, ptr: *const u8) {
    trace!(target: "allocator", size, ptr = ?ptr, "freed block");
}

#[inline]
pub fn log_reallocation(old_size: usize, new_size: usize, ptr: *const u8) {
    trace!(
        target: "allocator",
        old_size,
        new_size,
        ptr = ?ptr,
        "reallocated block"
    );
}

/// Log a request the arena could not serve
pub fn log_arena_exhausted(size: usize, remaining: usize) {
    error!(
        target: "allocator",
        requested = size,
        remaining,
        "arena exhausted"
    );
}

pub fn log_arena_reset(capacity: usize, used: usize) {
    debug!(target: "allocator", capacity, used, "arena reset");
}

/// Log a spill to the system heap
///
/// The first spill is a warning: it usually means the arena is undersized.
pub fn log_fallback(size: usize, spills: usize, remaining: usize) {
    if spills == 1 {
        warn!(
            target: "allocator",
            size,
            remaining,
            "arena exhausted, falling back to system heap"
        );
    } else {
        debug!(target: "allocator", size, spills, remaining, "heap fallback");
    }
}

pub fn log_reset_with_heap_blocks(blocks: usize, bytes: usize) {
    debug!(
        target: "allocator",
        heap_blocks = blocks,
        heap_bytes = bytes,
        "arena reset with heap blocks still live"
    );
}

/// Log a panic caught inside the runtime's allocator callback
pub fn log_allocator_abort(message: &str) {
    error!(target: "allocator", error = message, "allocator failed inside runtime, aborting");
}

// ============================================================================
// Bridge events
// ============================================================================

/// Log a native call dispatched from script
#[inline]
pub fn log_native_call(callable: &str, arg_count: usize) {
    trace!(target: "bridge", callable, args = arg_count, "native call");
}

/// Log a marshalling or dispatch failure about to be raised into script
pub fn log_bridge_error(callable: &str, error: &dyn std::fmt::Display) {
    debug!(target: "bridge", callable, error = %error, "native call rejected");
}

pub fn log_instance_created(class: &str, ptr: *const u8) {
    trace!(target: "bridge", class, ptr = ?ptr, "instance created");
}

pub fn log_instance_destroyed(class: &str, ptr: *const u8) {
    trace!(target: "bridge", class, ptr = ?ptr, "instance finalized");
}

/// Log registration of native entry points into a runtime
pub fn log_bridge_installed(functions: usize, classes: usize) {
    debug!(target: "bridge", functions, classes, "registry installed");
}

// ============================================================================
// Host events
// ============================================================================

pub fn log_host_created(capacity: usize, open_libs: bool) {
    info!(target: "host", arena_capacity = capacity, open_libs, "script host created");
}

pub fn log_host_closed(live_instances: usize, calls_made: usize) {
    info!(target: "host", live_instances, calls_made, "script host closed");
}

pub fn log_compile_error(chunk: &str, message: &str) {
    warn!(target: "host", chunk, error = message, "script failed to compile");
}

pub fn log_runtime_error(context: &str, message: &str) {
    warn!(target: "host", context, error = message, "script raised an error");
}
