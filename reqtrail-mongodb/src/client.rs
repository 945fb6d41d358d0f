use std::time::{Duration, Instant};

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use reqtrail::config::MongoDbConfig;
use reqtrail::health::{HealthCheck, HealthCheckResult};
use thiserror::Error;
use tracing::{error, info};

const CLIENT_NAME: &str = "mongoDbClient";

/// Errors raised while setting up MongoDB.
#[derive(Debug, Error)]
pub enum MongoDbError {
    /// The connection string was rejected by the driver.
    #[error("invalid mongodb connection string")]
    InvalidUrl(#[source] mongodb::error::Error),

    /// No server answered the initial ping.
    #[error("failed to connect to mongodb")]
    ConnectionFailed(#[source] mongodb::error::Error),
}

/// Driver pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoDbClientOptions {
    /// Maximum number of pooled connections (default: 10)
    pub max_pool_size: u32,
    /// How long an operation waits for a usable server (default: 5 seconds)
    pub server_selection_timeout: Duration,
}

impl Default for MongoDbClientOptions {
    fn default() -> Self {
        Self {
            max_pool_size: 10,
            server_selection_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared MongoDB client bound to the configured database.
#[derive(Debug, Clone)]
pub struct MongoDbClient {
    client: Client,
    database: Database,
}

impl MongoDbClient {
    /// Connects with default settings, failing if no server answers a ping.
    pub async fn connect(config: &MongoDbConfig) -> Result<Self, MongoDbError> {
        Self::connect_with(config, &MongoDbClientOptions::default()).await
    }

    /// Connects with custom pool settings.
    pub async fn connect_with(
        config: &MongoDbConfig,
        options: &MongoDbClientOptions,
    ) -> Result<Self, MongoDbError> {
        let client = Self::lazy(config, options).await?;
        client
            .ping()
            .await
            .map_err(MongoDbError::ConnectionFailed)?;
        info!(host = ?config.host(), database = %config.database, "Mongo connection established");
        Ok(client)
    }

    /// Builds the client without contacting the server.
    ///
    /// Pool settings given in the connection string win over `options`.
    pub async fn lazy(
        config: &MongoDbConfig,
        options: &MongoDbClientOptions,
    ) -> Result<Self, MongoDbError> {
        let mut client_options = ClientOptions::parse(&config.url)
            .await
            .map_err(MongoDbError::InvalidUrl)?;
        if client_options.max_pool_size.is_none() {
            client_options.max_pool_size = Some(options.max_pool_size);
        }
        if client_options.server_selection_timeout.is_none() {
            client_options.server_selection_timeout = Some(options.server_selection_timeout);
        }
        client_options.app_name = Some("reqtrail".to_string());

        let client = Client::with_options(client_options).map_err(MongoDbError::InvalidUrl)?;
        Ok(Self::from_client(client, &config.database))
    }

    /// Wraps an existing driver client.
    pub fn from_client(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    /// The configured database.
    pub const fn database(&self) -> &Database {
        &self.database
    }

    async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Pings the server: `mongoDbClient OK` or `mongoDbClient ERROR`.
    pub async fn healthcheck(&self) -> String {
        match self.ping().await {
            Ok(()) => format!("{CLIENT_NAME} OK"),
            Err(error) => {
                error!(error = %error, "{CLIENT_NAME} healthcheck failed");
                format!("{CLIENT_NAME} ERROR")
            }
        }
    }

    /// Closes the pooled connections and stops the driver's monitors.
    pub async fn close(&self) {
        info!("Closing Mongo connection...");
        self.client.clone().shutdown().await;
        info!("Mongo connection closed");
    }
}

#[async_trait]
impl HealthCheck for MongoDbClient {
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

    fn config(port: u16) -> MongoDbConfig {
        MongoDbConfig {
            url: format!("mongodb://127.0.0.1:{port}/?directConnection=true"),
            database: "devel".to_string(),
        }
    }

    fn impatient() -> MongoDbClientOptions {
        MongoDbClientOptions {
            server_selection_timeout: Duration::from_millis(300),
            ..MongoDbClientOptions::default()
        }
    }

    #[test]
    fn default_options_match_the_documented_limits() {
        let options = MongoDbClientOptions::default();
        assert_eq!(options.max_pool_size, 10);
        assert_eq!(options.server_selection_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let config = MongoDbConfig {
            url: "mongodb://127.0.0.1:not-a-port".to_string(),
            database: "devel".to_string(),
        };
        assert!(matches!(
            MongoDbClient::lazy(&config, &impatient()).await,
            Err(MongoDbError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn connect_fails_when_no_server_answers() {
        let port = closed_port().await;
        assert!(matches!(
            MongoDbClient::connect_with(&config(port), &impatient()).await,
            Err(MongoDbError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn unreachable_server_reports_error() {
        let client = MongoDbClient::lazy(&config(closed_port().await), &impatient())
            .await
            .unwrap();

        assert_eq!(client.database().name(), "devel");
        assert_eq!(client.healthcheck().await, "mongoDbClient ERROR");
        assert!(logs_contain("mongoDbClient healthcheck failed"));
        let result = client.check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(client.name(), "mongoDbClient");
    }

    #[tokio::test]
    async fn connection_string_settings_win_over_defaults() {
        let config = MongoDbConfig {
            url: format!(
                "mongodb://127.0.0.1:{}/?directConnection=true&serverSelectionTimeoutMS=100",
                closed_port().await
            ),
            database: "devel".to_string(),
        };
        let start = Instant::now();
        assert!(MongoDbClient::connect(&config).await.is_err());
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
