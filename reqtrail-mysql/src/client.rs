use std::time::{Duration, Instant};

use async_trait::async_trait;
use nutype::nutype;
use reqtrail::config::MySqlConfig;
use reqtrail::health::{HealthCheck, HealthCheckResult};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use thiserror::Error;
use tracing::{error, info};

const CLIENT_NAME: &str = "mySqlClient";

/// Errors raised while setting up MySQL.
#[derive(Debug, Error)]
pub enum MySqlError {
    /// The pool could not open its first connection.
    #[error("failed to create mysql connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
}

/// Maximum number of database connections in the pool.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct MySqlPoolConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 60 seconds)
    pub idle_timeout: Duration,
}

impl Default for MySqlPoolConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 = match std::num::NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl MySqlPoolConfig {
    fn options(&self) -> MySqlPoolOptions {
        let max_connections: std::num::NonZeroU32 = self.max_connections.into();
        MySqlPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

/// Shared MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Connect options for the configured server.
    pub fn connect_options(config: &MySqlConfig) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .username(&config.user);
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        options
    }

    /// Opens the pool with default settings, failing if the server is unreachable.
    pub async fn connect(config: &MySqlConfig) -> Result<Self, MySqlError> {
        Self::connect_with(config, &MySqlPoolConfig::default()).await
    }

    /// Opens the pool with custom settings.
    pub async fn connect_with(
        config: &MySqlConfig,
        pool_config: &MySqlPoolConfig,
    ) -> Result<Self, MySqlError> {
        let pool = pool_config
            .options()
            .connect_with(Self::connect_options(config))
            .await
            .map_err(MySqlError::ConnectionFailed)?;
        info!(host = %config.host, database = ?config.database, "{CLIENT_NAME} connected");
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub const fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Acquires and releases a connection: `mySqlClient OK` or `mySqlClient ERROR`.
    pub async fn healthcheck(&self) -> String {
        match self.pool.acquire().await {
            Ok(connection) => {
                drop(connection);
                format!("{CLIENT_NAME} OK")
            }
            Err(error) => {
                error!(error = %error, "{CLIENT_NAME} healthcheck failed");
                format!("{CLIENT_NAME} ERROR")
            }
        }
    }

    /// Closes every connection; later acquires fail.
    pub async fn close(&self) {
        info!("Closing MySql pool...");
        self.pool.close().await;
        info!("MySql pool closed");
    }
}

#[async_trait]
impl HealthCheck for MySqlClient {
    fn name(&self) -> &str {
        CLIENT_NAME
    }

    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let message = self.healthcheck().await;
        if message.ends_with("OK") {
            HealthCheckResult::healthy(message, start.elapsed())
        } else {
            HealthCheckResult::unhealthy(message, start.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqtrail::health::HealthStatus;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn unreachable_client(port: u16) -> MySqlClient {
        let config = MySqlConfig {
            host: "127.0.0.1".to_string(),
            user: "root".to_string(),
            password: Some("secret".to_string()),
            database: Some("devel".to_string()),
        };
        let pool = MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy_with(MySqlClient::connect_options(&config).port(port));
        MySqlClient::from_pool(pool)
    }

    #[test]
    fn default_pool_matches_the_documented_limits() {
        let config = MySqlPoolConfig::default();
        let max: std::num::NonZeroU32 = config.max_connections.into();
        assert_eq!(max.get(), 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    #[traced_test]
    async fn unreachable_server_reports_error() {
        let client = unreachable_client(closed_port().await);

        assert_eq!(client.healthcheck().await, "mySqlClient ERROR");
        assert!(logs_contain("mySqlClient healthcheck failed"));
        let result = client.check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(client.name(), "mySqlClient");
    }

    #[tokio::test]
    async fn closed_pool_reports_error() {
        let client = unreachable_client(closed_port().await);
        client.close().await;
        assert!(client.pool().is_closed());
        assert_eq!(client.healthcheck().await, "mySqlClient ERROR");
    }
}
