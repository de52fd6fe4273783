//! Palisade Logging
//!
//! Structured logging facade used by the Palisade HTTP client. Output goes to
//! a pluggable [`LogSink`]; the default sink writes to stderr in the format
//! selected by `PALISADE_LOG_FORMAT`.
//!
//! # Usage
//!
//! ```rust
//! use palisade_log::{critical, debug, error, info, warn};
//!
//! debug!("Resolving endpoint");
//! info!("Client ready with {} retries", 3);
//! warn!("Retrying request");
//! error!("Request failed");
//! critical!(target: "palisade::http", "Transport unreachable");
//! ```
//!
//! # Environment Variables
//!
//! - `PALISADE_DEBUG=1` - Enable debug logging
//! - `PALISADE_LOG_LEVEL=trace|debug|info|warn|error|critical|off` - Set log level
//! - `PALISADE_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `PALISADE_LOG_COLOR=1|0` - Enable/disable colors
//! - `PALISADE_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `PALISADE_LOG_MODULE=1|0` - Include the log target

use once_cell::sync::Lazy;
use std::env;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

// ============================================================================
// Log Levels
// ============================================================================

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level
    Error = 4,
    /// Critical level, for failures that leave the caller without any response
    Critical = 5,
    /// Off (no logging)
    Off = 6,
}

impl Level {
    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Off => "OFF",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            5 => Level::Critical,
            _ => Level::Off,
        }
    }

    /// Get colored level name (if color feature enabled).
    #[cfg(feature = "color")]
    pub fn colored(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => "TRACE".magenta(),
            Level::Debug => "DEBUG".blue(),
            Level::Info => "INFO".green(),
            Level::Warn => "WARN".yellow(),
            Level::Error => "ERROR".red(),
            Level::Critical => "CRITICAL".red().bold(),
            Level::Off => "OFF".white(),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            "off" | "none" => Ok(Level::Off),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for the default stderr sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-column format, colored when enabled
    Pretty,
    /// Compact single-line format
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

// ============================================================================
// Global Configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

static SINK: Lazy<RwLock<Option<Arc<dyn LogSink>>>> = Lazy::new(|| RwLock::new(None));

/// Logging configuration.
#[derive(Debug)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the log target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let debug = env_flag("PALISADE_DEBUG").unwrap_or(false);

        let level = env::var("PALISADE_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("PALISADE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let color = env_flag("PALISADE_LOG_COLOR")
            .unwrap_or_else(|| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok());

        DEBUG_ENABLED.store(debug, Ordering::SeqCst);
        LOG_LEVEL.store(level as u8, Ordering::SeqCst);

        Self {
            debug,
            level,
            format,
            color,
            timestamps: env_flag("PALISADE_LOG_TIMESTAMPS").unwrap_or(true),
            module_path: env_flag("PALISADE_LOG_MODULE").unwrap_or(true),
        }
    }
}

// ============================================================================
// Records and Sinks
// ============================================================================

/// A single log event as handed to a [`LogSink`].
#[derive(Debug, Clone)]
pub struct Record<'a> {
    /// Severity
    pub level: Level,
    /// Target, usually the module path
    pub target: &'a str,
    /// Rendered message
    pub message: &'a str,
    /// Structured key/value fields
    pub fields: &'a [(&'a str, String)],
}

/// Destination for log records.
///
/// The default sink writes to stderr. Applications route records elsewhere
/// with [`set_sink`].
pub trait LogSink: Send + Sync {
    /// Emit a record. Must not panic.
    fn emit(&self, record: &Record<'_>);
}

/// Replace the active sink.
pub fn set_sink(sink: Arc<dyn LogSink>) {
    if let Ok(mut slot) = SINK.write() {
        *slot = Some(sink);
    }
}

/// Restore the default stderr sink.
pub fn reset_sink() {
    if let Ok(mut slot) = SINK.write() {
        *slot = None;
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the logging system eagerly.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Check if a log level is enabled.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    Lazy::force(&CONFIG);
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Get current log level.
pub fn current_level() -> Level {
    Lazy::force(&CONFIG);
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level at runtime.
pub fn set_level(level: Level) {
    Lazy::force(&CONFIG);
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Enable or disable debug mode at runtime.
pub fn set_debug(enabled: bool) {
    Lazy::force(&CONFIG);
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Log a message with the given level.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    log_fields(level, target, message, &[]);
}

/// Log a message with structured fields.
pub fn log_fields(level: Level, target: &str, message: &str, fields: &[(&str, String)]) {
    if !is_level_enabled(level) {
        return;
    }

    let record = Record {
        level,
        target,
        message,
        fields,
    };

    let sink = SINK.read().ok().and_then(|slot| slot.clone());
    match sink {
        Some(sink) => sink.emit(&record),
        None => StderrSink.emit(&record),
    }
}

/// Log a completed HTTP exchange.
///
/// `status` is `None` when no response was received.
pub fn http(method: &str, url: &str, status: Option<u16>, duration: Duration) {
    let level = match status {
        Some(code) if code < 400 => Level::Info,
        Some(_) => Level::Warn,
        None => Level::Error,
    };
    let status_text = status.map_or_else(|| "-".to_string(), |s| s.to_string());
    let message = format!(
        "{} {} {} {}ms",
        method,
        url,
        status_text,
        duration.as_millis()
    );
    log_fields(
        level,
        "palisade::http",
        &message,
        &[
            ("method", method.to_string()),
            ("url", url.to_string()),
            ("status", status_text),
            ("duration_ms", duration.as_millis().to_string()),
        ],
    );
}

// ============================================================================
// Default stderr sink
// ============================================================================

struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, record: &Record<'_>) {
        let config = config();
        match config.format {
            Format::Pretty => write_pretty(record, config),
            Format::Compact => write_compact(record, config),
            Format::Json => write_json(record),
        }
    }
}

fn render_fields(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!(" {k}={v}"))
        .collect()
}

fn write_pretty(record: &Record<'_>, config: &LogConfig) {
    let mut stderr = std::io::stderr().lock();

    if config.timestamps {
        let now = chrono::Local::now();
        let _ = write!(stderr, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
    }

    #[cfg(feature = "color")]
    if config.color {
        let _ = write!(stderr, "{:8} ", record.level.colored());
    } else {
        let _ = write!(stderr, "{:8} ", record.level.as_str());
    }

    #[cfg(not(feature = "color"))]
    let _ = write!(stderr, "{:8} ", record.level.as_str());

    if config.module_path && !record.target.is_empty() {
        let _ = write!(stderr, "[{}] ", record.target);
    }

    let _ = writeln!(stderr, "{}{}", record.message, render_fields(record.fields));
}

fn write_compact(record: &Record<'_>, config: &LogConfig) {
    let mut stderr = std::io::stderr().lock();

    if config.timestamps {
        let now = chrono::Local::now();
        let _ = write!(stderr, "{} ", now.format("%H:%M:%S"));
    }

    let _ = write!(
        stderr,
        "{} ",
        record.level.as_str().chars().next().unwrap_or('?')
    );

    if config.module_path && !record.target.is_empty() {
        let _ = write!(stderr, "{}: ", record.target);
    }

    let _ = writeln!(stderr, "{}", record.message);
}

#[cfg(feature = "json")]
fn write_json(record: &Record<'_>) {
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Entry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<&'a str, &'a str>,
    }

    let entry = Entry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: record.level.as_str(),
        target: record.target,
        message: record.message,
        fields: record
            .fields
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect(),
    };

    if let Ok(json) = serde_json::to_string(&entry) {
        eprintln!("{}", json);
    }
}

#[cfg(not(feature = "json"))]
fn write_json(record: &Record<'_>) {
    eprintln!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}"}}"#,
        chrono::Utc::now().to_rfc3339(),
        record.level.as_str(),
        escape_json(record.target),
        escape_json(record.message)
    );
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// Macros
// ============================================================================

/// Log a trace message.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a debug message.
///
/// Enabled by `PALISADE_DEBUG=1` or `PALISADE_LOG_LEVEL=debug`.
///
/// # Example
///
/// ```rust
/// use palisade_log::debug;
///
/// let key = "GET https://api.example.com/widgets";
/// debug!("Cache miss for {}", key);
/// debug!(target: "palisade::cache", "Sweeping expired entries");
/// ```
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, module_path!(), &format!($($arg)+));
        }
    };
}

/// Log a critical message.
#[macro_export]
macro_rules! critical {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Critical) {
            $crate::log($crate::Level::Critical, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        if $crate::is_level_enabled($crate::Level::Critical) {
            $crate::log($crate::Level::Critical, module_path!(), &format!($($arg)+));
        }
    };
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Bridge to `tracing-subscriber` honoring the Palisade log level.

    use super::*;

    /// Create a tracing subscriber filtered at the configured level.
    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let config = config();
        let level = match current_level() {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error | Level::Critical => "error",
            Level::Off => "off",
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config.color))
    }
}
