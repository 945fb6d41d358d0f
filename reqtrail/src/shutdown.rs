//! Graceful shutdown: OS signal handling and named cleanup hooks.

use std::future::Future;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{error, info};

/// Error type returned by a failing hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), HookError>> + Send>;

/// Collects cleanup hooks registered by clients during setup.
///
/// Hooks run once, in registration order, after the server stopped
/// accepting requests.
#[derive(Default)]
pub struct ShutdownManager {
    hooks: Mutex<Vec<(String, Hook)>>,
}

impl std::fmt::Debug for ShutdownManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownManager")
            .field("hooks", &self.hook_names())
            .finish()
    }
}

impl ShutdownManager {
    /// Creates a manager without hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named hook.
    pub fn register<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        let hook: Hook = Box::new(move || Box::pin(hook()));
        self.hooks.lock().push((name.into(), hook));
    }

    /// Names of the hooks still waiting to run.
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Runs and drains every hook, returning the names of those that failed.
    ///
    /// A failing hook does not stop the remaining ones.
    pub async fn run_all(&self) -> Vec<String> {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let mut failed = Vec::new();

        for (name, hook) in hooks {
            match hook().await {
                Ok(()) => info!(hook = %name, "shutdown hook completed"),
                Err(error) => {
                    error!(hook = %name, error = %error, "shutdown hook failed");
                    failed.push(name);
                }
            }
        }

        failed
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
