//! Axum REST server for reqtrail
//!
//! Wires the execution context middleware, the health endpoint and the todo
//! routes into one [`Router`]. [`bootstrap::setup`] builds the application
//! state from an [`AppConfig`](reqtrail::AppConfig); the `reqtrail-server`
//! binary serves it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use reqtrail::context::ContextTracker;
use reqtrail::health::HealthRegistry;
use reqtrail::shutdown::ShutdownManager;
use reqtrail::todos::TodosController;
use reqtrail::Environment;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Deployment environment, decides whether error codes are exposed
    pub environment: Environment,
    /// Todo use cases
    pub todos: TodosController,
    /// Health checks of the configured clients
    pub health: Arc<HealthRegistry>,
    /// Cleanup hooks run after the server stops
    pub shutdown: Arc<ShutdownManager>,
    /// Tracker owning the execution contexts of in-flight requests
    pub tracker: ContextTracker,
}

impl AppState {
    /// State with no health checks and no shutdown hooks.
    pub fn new(environment: Environment, todos: TodosController) -> Self {
        Self {
            environment,
            todos,
            health: Arc::new(HealthRegistry::new()),
            shutdown: Arc::new(ShutdownManager::new()),
            tracker: ContextTracker::new(),
        }
    }
}

/// Builds the application router.
pub fn create_app(state: AppState) -> Router {
    let tracker = state.tracker.clone();
    Router::new()
        .merge(routes::health::router())
        .merge(routes::todos::router())
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            tracker,
            middleware::execution_context,
        ))
}
