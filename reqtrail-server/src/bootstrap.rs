//! Startup: data-store clients, the todo repository and the shared state.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use reqtrail::clients::RedisClient;
use reqtrail::config::{AppConfig, TodoStoreKind};
use reqtrail::health::HealthCheck;
use reqtrail::shutdown::HookError;
use reqtrail::todos::{TodoRepository, TodosController};
use reqtrail_memory::InMemoryTodoRepository;
use reqtrail_mongodb::{MongoDbClient, MongoDbTodoRepository};
use reqtrail_mysql::{MySqlClient, MySqlTodoRepository};
use tracing::{error, info};

use crate::AppState;

/// Loads the configuration from `lookup` and the `.env` files in `dir`,
/// logging the outcome either way.
pub fn load_config<F>(lookup: F, dir: &Path) -> anyhow::Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    match AppConfig::from_sources(lookup, dir) {
        Ok(config) => {
            info!(config = %config.summary(), "configuration loaded");
            Ok(config)
        }
        Err(error) => {
            error!(error = %error, "invalid configuration");
            Err(error).context("invalid configuration")
        }
    }
}

/// Connects the clients switched on in `config`, registers their health
/// checks and shutdown hooks, and builds the todo controller.
pub async fn setup(config: &AppConfig) -> anyhow::Result<AppState> {
    let mut mysql = None;
    let mut mongodb = None;
    let mut registrations: Vec<Registration> = Vec::new();

    if let Some(redis_config) = &config.redis {
        let client = Arc::new(
            RedisClient::connect(redis_config)
                .await
                .context("Redis setup failed")?,
        );
        registrations.push(Registration::Redis(client));
    }

    if let Some(mysql_config) = &config.mysql {
        let client = Arc::new(
            MySqlClient::connect(mysql_config)
                .await
                .context("MySql setup failed")?,
        );
        mysql = Some(Arc::clone(&client));
        registrations.push(Registration::MySql(client));
    }

    if let Some(mongodb_config) = &config.mongodb {
        let client = Arc::new(
            MongoDbClient::connect(mongodb_config)
                .await
                .context("MongoDb setup failed")?,
        );
        mongodb = Some(Arc::clone(&client));
        registrations.push(Registration::MongoDb(client));
    }

    let repository = todo_repository(config, mysql.as_deref(), mongodb.as_deref()).await?;
    let todos = TodosController::initialize(&config.todos, repository)
        .context("todos controller initialization failed")?;

    let state = AppState::new(config.environment, todos);
    for registration in registrations {
        registration.apply(&state);
    }

    info!(
        checks = ?state.health.names(),
        hooks = ?state.shutdown.hook_names(),
        "application state ready"
    );
    Ok(state)
}

async fn todo_repository(
    config: &AppConfig,
    mysql: Option<&MySqlClient>,
    mongodb: Option<&MongoDbClient>,
) -> anyhow::Result<Arc<dyn TodoRepository>> {
    match config.todos.store {
        TodoStoreKind::Memory => Ok(Arc::new(
            InMemoryTodoRepository::with_table(&config.todos.table)
                .context("invalid todos table")?,
        )),
        TodoStoreKind::MySql => {
            let client = mysql.context("the mysql todo store requires MYSQL_ON")?;
            let repository = MySqlTodoRepository::new(client.pool().clone(), &config.todos.table)
                .context("invalid todos table")?;
            repository
                .migrate()
                .await
                .context("todos table migration failed")?;
            repository
                .initialize()
                .await
                .context("todos table missing")?;
            Ok(Arc::new(repository))
        }
        TodoStoreKind::MongoDb => {
            let client = mongodb.context("the mongodb todo store requires MONGODB_ON")?;
            let repository = MongoDbTodoRepository::new(client.database(), &config.todos.table)
                .context("invalid todos collection")?;
            repository
                .migrate()
                .await
                .context("todos collection creation failed")?;
            repository
                .initialize()
                .await
                .context("todos collection missing")?;
            Ok(Arc::new(repository))
        }
    }
}

enum Registration {
    Redis(Arc<RedisClient>),
    MySql(Arc<MySqlClient>),
    MongoDb(Arc<MongoDbClient>),
}

impl Registration {
    fn apply(self, state: &AppState) {
        match self {
            Self::Redis(client) => {
                state.health.register(Arc::clone(&client) as Arc<dyn HealthCheck>);
                state.shutdown.register("redisClient", move || async move {
                    info!("Closing Redis connection...");
                    client.quit().await.map_err(HookError::from)
                });
            }
            Self::MySql(client) => {
                state.health.register(Arc::clone(&client) as Arc<dyn HealthCheck>);
                state.shutdown.register("mySqlClient", move || async move {
                    client.close().await;
                    Ok(())
                });
            }
            Self::MongoDb(client) => {
                state.health.register(Arc::clone(&client) as Arc<dyn HealthCheck>);
                state.shutdown.register("mongoDbClient", move || async move {
                    client.close().await;
                    Ok(())
                });
            }
        }
    }
}
