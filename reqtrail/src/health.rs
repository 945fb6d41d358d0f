use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy and functioning normally
    Healthy,
    /// Component is degraded but still operational
    Degraded,
    /// Component is unhealthy and not functioning properly
    Unhealthy,
}

/// Details about a health check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    /// The health status
    pub status: HealthStatus,
    /// Human-readable description of the health check
    pub message: String,
    /// How long the health check took to complete, in milliseconds
    pub duration_ms: u64,
    /// Additional metadata about the health check
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl HealthCheckResult {
    fn with_status(status: HealthStatus, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status,
            message: message.into(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            metadata: HashMap::new(),
        }
    }

    /// Create a new healthy result
    pub fn healthy(message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(HealthStatus::Healthy, message, duration)
    }

    /// Create a new degraded result
    pub fn degraded(message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(HealthStatus::Degraded, message, duration)
    }

    /// Create a new unhealthy result
    pub fn unhealthy(message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(HealthStatus::Unhealthy, message, duration)
    }

    /// Add metadata to the health check result
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Trait for performing health checks on system components
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// The name of this health check
    fn name(&self) -> &str;

    /// Perform the health check
    async fn check(&self) -> HealthCheckResult;

    /// Get the timeout for this health check
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

/// Result of one named check inside a [`HealthReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedHealthResult {
    /// Check name
    pub name: String,
    /// Check outcome
    #[serde(flatten)]
    pub result: HealthCheckResult,
}

/// Outcome of running every registered check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status across all checks, healthy when there are none
    pub status: HealthStatus,
    /// Individual results in registration order
    pub checks: Vec<NamedHealthResult>,
}

/// Holds the application's health checks.
#[derive(Default)]
pub struct HealthRegistry {
    checks: RwLock<Vec<Arc<dyn HealthCheck>>>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .checks
            .read()
            .iter()
            .map(|check| check.name().to_string())
            .collect();
        f.debug_struct("HealthRegistry").field("checks", &names).finish()
    }
}

impl HealthRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a check.
    pub fn register(&self, check: Arc<dyn HealthCheck>) {
        self.checks.write().push(check);
    }

    /// Names of the registered checks.
    pub fn names(&self) -> Vec<String> {
        self.checks
            .read()
            .iter()
            .map(|check| check.name().to_string())
            .collect()
    }

    /// Runs every check under its own timeout, one after the other.
    pub async fn run(&self) -> HealthReport {
        let checks: Vec<Arc<dyn HealthCheck>> = self.checks.read().clone();

        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            let start = Instant::now();
            let result = match tokio::time::timeout(check.timeout(), check.check()).await {
                Ok(result) => result,
                Err(_) => HealthCheckResult::unhealthy(
                    format!("{} timed out", check.name()),
                    start.elapsed(),
                )
                .with_metadata("error_type", "timeout"),
            };
            results.push(NamedHealthResult {
                name: check.name().to_string(),
                result,
            });
        }

        let status = results
            .iter()
            .map(|named| named.result.status)
            .fold(HealthStatus::Healthy, worst);

        HealthReport {
            status,
            checks: results,
        }
    }
}

const fn worst(left: HealthStatus, right: HealthStatus) -> HealthStatus {
    match (left, right) {
        (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
        (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    }
}
