//! Structured logging enriched with the current request context.
//!
//! Every entry written through [`AppLogger`] merges the caller's fields with
//! the [`ContextRecord`] of the request being handled, so log lines can be
//! tied back to the request that produced them. Code running outside any
//! request logs without context instead of failing.
//!
//! [`init_tracing`] installs the process-wide subscriber: JSON lines on
//! stdout, in `app.log` at the configured level, and in `errors.log` for
//! `ERROR` only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::Environment;
use crate::context::{get_context, ContextRecord};
use crate::errors::LoggingError;

/// Log level enumeration for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// One structured log line
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Timestamp of the log entry
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Component that generated the log
    pub component: String,
    /// Caller supplied fields
    pub fields: Map<String, Value>,
    /// Context of the request being handled, if any
    pub context: Option<Arc<ContextRecord>>,
}

impl LogEntry {
    /// Creates an entry bound to the current request context, if there is one.
    pub fn new(level: LogLevel, message: &str, component: &str) -> Self {
        Self {
            level,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
            component: component.to_string(),
            fields: Map::new(),
            context: get_context(),
        }
    }

    /// Adds a field to the log entry
    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Merges caller fields into the entry.
    ///
    /// Objects are merged key by key; any other non-null value is kept under
    /// `details`.
    #[must_use]
    pub fn with_fields(mut self, fields: &Value) -> Self {
        match fields {
            Value::Object(map) => {
                for (key, value) in map {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                self.fields.insert("details".to_string(), other.clone());
            }
        }
        self
    }

    /// Correlation id of the bound context, empty outside a request.
    pub fn correlation_id(&self) -> String {
        self.context
            .as_ref()
            .map(|record| record.correlation_id.to_string())
            .unwrap_or_default()
    }

    /// Converts to JSON for structured output.
    ///
    /// Context keys are written last and win over caller fields of the same
    /// name.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("level".to_string(), json!(format!("{:?}", self.level).to_lowercase()));
        object.insert("message".to_string(), json!(self.message));
        object.insert("timestamp".to_string(), json!(self.timestamp.to_rfc3339()));
        object.insert("component".to_string(), json!(self.component));

        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }

        if let Some(Value::Object(context)) = self
            .context
            .as_ref()
            .and_then(|record| serde_json::to_value(record.as_ref()).ok())
        {
            object.extend(context);
        }

        Value::Object(object)
    }

    /// Logs the entry using tracing
    pub fn log(&self) {
        let json_str = self.to_json().to_string();
        let correlation_id = self.correlation_id();
        let component = self.component.as_str();

        match self.level {
            LogLevel::Debug => {
                tracing::debug!(component, correlation_id = %correlation_id, "{}", json_str);
            }
            LogLevel::Info => {
                tracing::info!(component, correlation_id = %correlation_id, "{}", json_str);
            }
            LogLevel::Warn => {
                tracing::warn!(component, correlation_id = %correlation_id, "{}", json_str);
            }
            LogLevel::Error => {
                tracing::error!(component, correlation_id = %correlation_id, "{}", json_str);
            }
        }
    }
}

/// Context-aware logger for one application component.
#[derive(Debug, Clone)]
pub struct AppLogger {
    component: String,
    default_fields: Map<String, Value>,
}

impl AppLogger {
    /// Creates a new logger for a component
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            default_fields: Map::new(),
        }
    }

    /// Adds a default field that will be included in all log entries
    #[must_use]
    pub fn with_default_field(mut self, key: &str, value: Value) -> Self {
        self.default_fields.insert(key.to_string(), value);
        self
    }

    fn emit(&self, level: LogLevel, message: &str, fields: &Value) -> LogEntry {
        let mut entry = LogEntry::new(level, message, &self.component);
        for (key, value) in &self.default_fields {
            entry = entry.with_field(key, value.clone());
        }
        let entry = entry.with_fields(fields);
        entry.log();
        entry
    }

    /// Logs a debug message
    pub fn debug(&self, message: &str, fields: &Value) -> LogEntry {
        self.emit(LogLevel::Debug, message, fields)
    }

    /// Logs an info message
    pub fn info(&self, message: &str, fields: &Value) -> LogEntry {
        self.emit(LogLevel::Info, message, fields)
    }

    /// Logs a warning message
    pub fn warn(&self, message: &str, fields: &Value) -> LogEntry {
        self.emit(LogLevel::Warn, message, fields)
    }

    /// Logs an error message
    pub fn error(&self, message: &str, fields: &Value) -> LogEntry {
        self.emit(LogLevel::Error, message, fields)
    }

    /// Logs an error message with the error's display text under `error`.
    pub fn error_with(&self, message: &str, error: &dyn std::error::Error) -> LogEntry {
        self.emit(LogLevel::Error, message, &json!({ "error": error.to_string() }))
    }
}

/// File every log line at the configured level is appended to.
pub const APP_LOG_FILE: &str = "app.log";

/// File only `ERROR` lines are appended to.
pub const ERROR_LOG_FILE: &str = "errors.log";

/// A layer over the plain registry, boxed so layers can be collected.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where and how verbosely the process logs.
///
/// Read from the process environment alone, so it is available before
/// [`AppConfig`](crate::config::AppConfig) loads and can report its
/// failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Decides the default level
    pub environment: Environment,
    /// Directory holding the log files
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_dir: PathBuf::from("."),
        }
    }
}

impl LoggingConfig {
    /// Reads `APP_ENV` and `LOG_DIR` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `APP_ENV` and `LOG_DIR` through `lookup`.
    ///
    /// An unknown `APP_ENV` falls back to the default environment here;
    /// [`AppConfig`](crate::config::AppConfig) rejects it later with a
    /// logged error.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            environment: non_empty("APP_ENV")
                .and_then(|value| Environment::parse(&value).ok())
                .unwrap_or_default(),
            log_dir: non_empty("LOG_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
        }
    }

    /// `RUST_LOG` when set, otherwise `info` in production and `debug`
    /// everywhere else.
    pub fn directive(&self) -> String {
        std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| {
            if self.environment.is_production() {
                "info".to_string()
            } else {
                "debug".to_string()
            }
        })
    }
}

/// Keeps the background file writers running.
///
/// Dropping it flushes whatever is still buffered, so hold it until the
/// process exits.
#[must_use = "file logging stops when the guards are dropped"]
#[derive(Debug, Default)]
pub struct LogGuards(Vec<WorkerGuard>);

/// Builds the JSON layers: stdout and `app.log` at `directive`, plus
/// `errors.log` with `ERROR` lines only.
pub fn layers(
    directive: &str,
    log_dir: &Path,
) -> Result<(Vec<BoxedLayer>, LogGuards), LoggingError> {
    let (app_writer, app_guard) =
        tracing_appender::non_blocking(log_file(log_dir, APP_LOG_FILE)?);
    let (error_writer, error_guard) =
        tracing_appender::non_blocking(log_file(log_dir, ERROR_LOG_FILE)?);

    let layers = vec![
        console_layer(directive),
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_current_span(true)
            .with_writer(app_writer)
            .with_filter(EnvFilter::new(directive))
            .boxed(),
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_current_span(true)
            .with_writer(error_writer)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    ];
    Ok((layers, LogGuards(vec![app_guard, error_guard])))
}

fn console_layer(directive: &str) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_filter(EnvFilter::new(directive))
        .boxed()
}

fn log_file(log_dir: &Path, name: &str) -> Result<RollingFileAppender, LoggingError> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(log_dir)?)
}

/// Installs the global JSON subscriber writing to stdout, `app.log` and
/// `errors.log` under `config.log_dir`.
pub fn init_tracing(config: &LoggingConfig) -> Result<LogGuards, LoggingError> {
    let (layers, guards) = layers(&config.directive(), &config.log_dir)?;
    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(guards)
}
