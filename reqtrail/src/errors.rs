//! Error types for reqtrail.
//!
//! Each subsystem has its own error enum so callers can decide how to react:
//!
//! - **ContextError**: misuse of the execution context tracker
//! - **ConfigError**: missing or malformed environment configuration
//! - **RepositoryError**: failures of a Todo storage backend
//! - **ClientError**: data-store client setup and protocol failures
//! - **LoggingError**: installing the tracing subscriber and its log files
//!
//! Domain failures of the Todo controller are reported through
//! [`TodoError`](crate::todos::TodoError), which carries a numeric code that
//! ends up in the response envelope.

use crate::types::TaskHandle;
use thiserror::Error;

/// Errors raised by the execution context tracker.
///
/// A missing context is not an error for [`get_context`](crate::context::get_context),
/// which returns `None`; these variants are only produced by the strict
/// operations and always mean a collaborator was wired incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A correlation id was requested from code not running inside a request.
    #[error("no active execution context: correlation id requested outside a tracked request")]
    NoActiveContext,

    /// A context was created outside any unit opened by a `ContextTracker`.
    #[error("cannot create an execution context outside a tracked unit of work")]
    Untracked,

    /// The unit owning the context already finished.
    #[error("tracked unit {0} has already finished")]
    UnitFinished(TaskHandle),
}

/// Errors raised while loading [`AppConfig`](crate::config::AppConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is not set or empty.
    #[error("missing required configuration variable {variable}")]
    Missing {
        /// Name of the variable
        variable: &'static str,
    },

    /// An environment variable is set but its value is unusable.
    #[error("invalid value for {variable}: {reason}")]
    Invalid {
        /// Name of the variable
        variable: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The `.env` file exists but could not be read or parsed.
    #[error("failed to load {path}: {reason}")]
    EnvFile {
        /// Path of the file
        path: String,
        /// Read or parse failure
        reason: String,
    },
}

/// Errors raised while installing the global tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A log file could not be created in the log directory.
    #[error("cannot open log file: {0}")]
    File(#[from] tracing_appender::rolling::InitError),

    /// Another global subscriber is already installed.
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Errors returned by a [`TodoRepository`](crate::todos::TodoRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The supplied identifier is not a valid todo id.
    #[error("Invalid ID format.")]
    InvalidId,

    /// The backing table or collection does not exist.
    #[error("Table \"{0}\" does not exist in the database.")]
    MissingTable(String),

    /// The table name is empty, malformed or outside the whitelist.
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    /// The storage backend could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The storage backend rejected or failed a query.
    #[error("Query failed: {0}")]
    Query(String),

    /// A stored or returned value could not be encoded.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors raised by the data-store clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client configuration did not validate.
    #[error("{client} configuration validation error: {reason}")]
    InvalidConfig {
        /// Which client rejected its configuration
        client: &'static str,
        /// Why the configuration was rejected
        reason: String,
    },

    /// The client was used before `connect` or after shutdown.
    #[error("{0} not initialized.")]
    NotConnected(&'static str),

    /// Network level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The server answered with something the client can not parse.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
