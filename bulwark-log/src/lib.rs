//! Bulwark Logging
//!
//! Structured logging for the Bulwark crates, controlled through
//! `BULWARK_*` environment variables.
//!
//! # Features
//!
//! - **Environment-controlled**: `BULWARK_DEBUG=1` enables debug logging
//! - **Cheap when disabled**: level checks happen before any formatting
//! - **Facade bridge**: records can be forwarded to the `log` crate
//! - **Capture**: records emitted on the current thread can be collected,
//!   which lets tests assert on what was (and was not) logged
//!
//! # Usage
//!
//! ```rust
//! use bulwark_log::{debug, info, warn, error, trace};
//!
//! debug!("Loading stored secret");
//! info!("Issued token for form {}", "login");
//! warn!("Rejected request without token");
//! error!("Secret could not be persisted");
//!
//! let method = "POST";
//! debug!(target: "bulwark::csrf", "Validating {} request", method);
//! ```
//!
//! # Environment Variables
//!
//! - `BULWARK_DEBUG=1` - Enable debug logging
//! - `BULWARK_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `BULWARK_LOG_FORMAT=pretty|compact|json|facade` - Set output format
//! - `BULWARK_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `BULWARK_LOG_MODULE=1|0` - Include the log target

use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ============================================================================
// Levels and Formats
// ============================================================================

/// Severity of a record, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    /// Disables output entirely
    Off = 5,
}

const LEVELS: [(Level, &str, &[&str]); 6] = [
    (Level::Trace, "TRACE", &["trace"]),
    (Level::Debug, "DEBUG", &["debug"]),
    (Level::Info, "INFO", &["info"]),
    (Level::Warn, "WARN", &["warn", "warning"]),
    (Level::Error, "ERROR", &["error"]),
    (Level::Off, "OFF", &["off", "none"]),
];

impl Level {
    /// Parse a level name or alias, ignoring case and surrounding space.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        LEVELS
            .iter()
            .find(|(_, _, aliases)| aliases.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(level, _, _)| *level)
    }

    /// Upper-case label used in rendered output.
    pub fn as_str(&self) -> &'static str {
        LEVELS[*self as usize].1
    }

    fn from_u8(value: u8) -> Self {
        LEVELS
            .get(usize::from(value))
            .map(|(level, _, _)| *level)
            .unwrap_or(Level::Off)
    }

    fn to_facade(self) -> Option<log::Level> {
        Some(match self {
            Level::Trace => log::Level::Trace,
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
            Level::Off => return None,
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// How records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `2024-01-01 12:00:00.000 WARN  [target] message` on stderr
    Pretty,
    /// `12:00:00 W target: message` on stderr
    Compact,
    /// One JSON object per line on stderr
    Json,
    /// Handed to whatever `log` implementation the host installed
    Facade,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        let format = match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Format::Pretty,
            "compact" => Format::Compact,
            "json" => Format::Json,
            "facade" | "log" => Format::Facade,
            _ => return None,
        };
        Some(format)
    }
}

// ============================================================================
// Configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Output settings read once from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
    /// Include the record target in rendered output
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
            module_path: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl LogConfig {
    /// Read `BULWARK_*` variables and publish the level and debug flag to
    /// the runtime switches.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let debug = env_flag("BULWARK_DEBUG", defaults.debug);
        let fallback_level = if debug { Level::Debug } else { defaults.level };

        let config = Self {
            debug,
            level: env::var("BULWARK_LOG_LEVEL")
                .ok()
                .and_then(|s| Level::parse(&s))
                .unwrap_or(fallback_level),
            format: env::var("BULWARK_LOG_FORMAT")
                .ok()
                .and_then(|s| Format::parse(&s))
                .unwrap_or(defaults.format),
            timestamps: env_flag("BULWARK_LOG_TIMESTAMPS", defaults.timestamps),
            module_path: env_flag("BULWARK_LOG_MODULE", defaults.module_path),
        };

        DEBUG_ENABLED.store(config.debug, Ordering::SeqCst);
        LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);
        config
    }
}

/// Read the environment now instead of on the first level check.
pub fn init() {
    Lazy::force(&CONFIG);
}

pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[inline]
pub fn is_debug_enabled() -> bool {
    init();
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Whether a record at `level` would be emitted. Always true while a
/// [`capture`] is active on this thread.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    let threshold = LOG_LEVEL.load(Ordering::Relaxed);
    (level != Level::Off && level as u8 >= threshold) || capture_active()
}

pub fn current_level() -> Level {
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Toggle debug mode at runtime. Turning it on lowers the level to
/// `Debug` if it was higher.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

// ============================================================================
// Records
// ============================================================================

/// A single emitted log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(level: Level, target: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// The line written for this record, or `None` for [`Format::Facade`].
    pub fn render(&self, format: Format, config: &LogConfig) -> Option<String> {
        let show_target = config.module_path && !self.target.is_empty();
        let local = self.timestamp.with_timezone(&Local);

        let line = match format {
            Format::Pretty => {
                let mut line = String::new();
                if config.timestamps {
                    line.push_str(&format!("{} ", local.format("%Y-%m-%d %H:%M:%S%.3f")));
                }
                line.push_str(&format!("{:5} ", self.level));
                if show_target {
                    line.push_str(&format!("[{}] ", self.target));
                }
                line + &self.message
            }
            Format::Compact => {
                let mut line = String::new();
                if config.timestamps {
                    line.push_str(&format!("{} ", local.format("%H:%M:%S")));
                }
                line.push_str(&self.level.as_str()[..1]);
                line.push(' ');
                if show_target {
                    line.push_str(&format!("{}: ", self.target));
                }
                line + &self.message
            }
            Format::Json => self.to_json(),
            Format::Facade => return None,
        };
        Some(line)
    }

    #[cfg(feature = "json")]
    fn to_json(&self) -> String {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "level": self.level.as_str(),
            "target": self.target,
            "message": self.message,
        })
        .to_string()
    }

    #[cfg(not(feature = "json"))]
    fn to_json(&self) -> String {
        format!(
            r#"{{"timestamp":"{}","level":"{}","target":{},"message":{}}}"#,
            self.timestamp.to_rfc3339(),
            self.level.as_str(),
            json_string(&self.target),
            json_string(&self.message)
        )
    }
}

#[cfg(not(feature = "json"))]
fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// Capture
// ============================================================================

thread_local! {
    static CAPTURE: RefCell<Option<Vec<Record>>> = const { RefCell::new(None) };
}

fn capture_active() -> bool {
    CAPTURE.with(|c| c.borrow().is_some())
}

/// Run `f` and return every record it emitted on this thread, at any level.
///
/// Captured records are not written anywhere else. Captures nest; an inner
/// capture hides its records from the outer one.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Record>) {
    let outer = CAPTURE.with(|c| c.replace(Some(Vec::new())));
    let result = f();
    let records = CAPTURE.with(|c| c.replace(outer)).unwrap_or_default();
    (result, records)
}

// ============================================================================
// Output
// ============================================================================

#[doc(hidden)]
pub fn log(level: Level, target: &str, message: String) {
    let record = Record::new(level, target, message);

    let record = match CAPTURE.with(|c| match c.borrow_mut().as_mut() {
        Some(records) => {
            records.push(record);
            None
        }
        None => Some(record),
    }) {
        Some(record) => record,
        None => return,
    };

    if level == Level::Off || level < current_level() {
        return;
    }

    forward(&record, config());
}

/// Write `record` to stderr, or hand it to the `log` crate for [`Format::Facade`].
fn forward(record: &Record, config: &LogConfig) {
    match record.render(config.format, config) {
        Some(line) => eprintln!("{}", line),
        None => {
            if let Some(facade_level) = record.level.to_facade() {
                log::log!(target: record.target.as_str(), facade_level, "{}", record.message);
            }
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($enabled:expr, $level:ident, $target:expr, $($arg:tt)+) => {
        if $enabled {
            $crate::log($crate::Level::$level, $target, format!($($arg)+));
        }
    };
}

/// Log at trace level.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::is_level_enabled($crate::Level::Trace), Trace, $target, $($arg)+)
    };
    ($($arg:tt)+) => { $crate::trace!(target: module_path!(), $($arg)+) };
}

/// Log at debug level.
///
/// Enabled by `BULWARK_DEBUG=1` or `BULWARK_LOG_LEVEL=debug`.
///
/// ```rust
/// use bulwark_log::debug;
///
/// let name = "csrf_token";
/// debug!("Generated new secret for {}", name);
/// debug!(target: "bulwark::storage", "Cookie {} written", name);
/// ```
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!(
            $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug),
            Debug,
            $target,
            $($arg)+
        )
    };
    ($($arg:tt)+) => { $crate::debug!(target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::is_level_enabled($crate::Level::Info), Info, $target, $($arg)+)
    };
    ($($arg:tt)+) => { $crate::info!(target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::is_level_enabled($crate::Level::Warn), Warn, $target, $($arg)+)
    };
    ($($arg:tt)+) => { $crate::warn!(target: module_path!(), $($arg)+) };
}

#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::is_level_enabled($crate::Level::Error), Error, $target, $($arg)+)
    };
    ($($arg:tt)+) => { $crate::error!(target: module_path!(), $($arg)+) };
}
