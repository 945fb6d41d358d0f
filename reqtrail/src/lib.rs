//! `reqtrail` - request-scoped execution context for async REST backends
//!
//! Every inbound request gets a correlation id that any code running on its
//! behalf can read back, across `.await` points and spawned child tasks,
//! without threading it through function signatures. The rest of the crate
//! consumes that context: structured logging, the response envelope, health
//! checks, data-store clients and the Todo domain.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clients;
pub mod config;
pub mod context;
pub mod errors;
pub mod health;
pub mod logging;
pub mod response;
pub mod shutdown;
pub mod todos;
pub mod types;

pub use config::{AppConfig, Environment};
pub use context::{
    correlation_id, create_context, current_task, get_context, ContextRecord, ContextTracker,
    RequestMetadata,
};
pub use errors::{ClientError, ConfigError, ContextError, LoggingError, RepositoryError};
pub use logging::AppLogger;
pub use response::{ResponseBuilder, ResponseEnvelope};
pub use types::{CorrelationId, TaskHandle};
