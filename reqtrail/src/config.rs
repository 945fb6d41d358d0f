//! Application configuration loaded from the environment.
//!
//! Every value is parsed and validated once at startup so the rest of the
//! application never sees a half-valid configuration. Sections for optional
//! data stores are only validated when their `*_ON` switch is set.
//!
//! Variables come from the process environment first and then from the
//! `.env.{APP_ENV}` file of the working directory, if there is one.

use std::collections::HashMap;
use std::path::Path;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::ConfigError;

/// Port the HTTP server listens on.
#[nutype(
    validate(greater_or_equal = 1),
    default = 3000,
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Default,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct ServerPort(u16);

/// Deployment environment.
///
/// Production hides error details from response envelopes and logs at `info`
/// instead of `debug`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live deployment
    Production,
    /// Local development (default)
    #[default]
    Development,
    /// Automated tests
    Test,
}

impl Environment {
    /// Whether this is the production environment.
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Parses an environment name, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Invalid {
                variable: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }
}

/// Converts a loosely typed switch value to a boolean.
///
/// `"true"` in any case and `"1"` are true; everything else is false.
pub fn to_boolean(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `redis://[user:password@]host[:port]`
    pub url: String,
}

impl RedisConfig {
    fn validate(url: String) -> Result<Self, ConfigError> {
        let parsed = url::Url::parse(&url).map_err(|error| ConfigError::Invalid {
            variable: "REDIS_URL",
            reason: error.to_string(),
        })?;
        if parsed.scheme() != "redis" {
            return Err(ConfigError::Invalid {
                variable: "REDIS_URL",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if !parsed.host_str().is_some_and(|host| !host.is_empty()) {
            return Err(ConfigError::Invalid {
                variable: "REDIS_URL",
                reason: "missing host".to_string(),
            });
        }
        Ok(Self { url })
    }

    /// Host part of the url, for logging without credentials.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// MySQL connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MySqlConfig {
    /// Server host name
    pub host: String,
    /// Login user
    pub user: String,
    /// Login password
    pub password: Option<String>,
    /// Default database
    pub database: Option<String>,
}

impl std::fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

/// MongoDB connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoDbConfig {
    /// `mongodb://` or `mongodb+srv://` connection string
    pub url: String,
    /// Database the todo collection lives in
    pub database: String,
}

impl MongoDbConfig {
    fn validate(url: String, database: String) -> Result<Self, ConfigError> {
        let parsed = url::Url::parse(&url).map_err(|error| ConfigError::Invalid {
            variable: "MONGODB_URL",
            reason: error.to_string(),
        })?;
        if !matches!(parsed.scheme(), "mongodb" | "mongodb+srv") {
            return Err(ConfigError::Invalid {
                variable: "MONGODB_URL",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(Self { url, database })
    }

    /// Host part of the url, for logging without credentials.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

impl std::fmt::Debug for MongoDbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbConfig")
            .field("host", &self.host())
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Where todos are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStoreKind {
    /// Process memory, lost on restart (default)
    #[default]
    Memory,
    /// The MySQL database configured by the `MYSQL_*` variables
    MySql,
    /// The MongoDB database configured by the `MONGODB_*` variables
    #[serde(rename = "mongodb")]
    MongoDb,
}

/// Settings of the todos domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodosConfig {
    /// Storage backend
    pub store: TodoStoreKind,
    /// Table the todos live in
    pub table: String,
    /// Tables the todos domain is allowed to open
    pub whitelisted_tables: Vec<String>,
}

impl Default for TodosConfig {
    fn default() -> Self {
        Self {
            store: TodoStoreKind::Memory,
            table: crate::todos::TODOS_TABLE.to_string(),
            whitelisted_tables: vec![crate::todos::TODOS_TABLE.to_string()],
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Listen port
    pub port: ServerPort,
    /// Deployment environment
    pub environment: Environment,
    /// Redis settings, `Some` when `REDIS_ON` is set
    pub redis: Option<RedisConfig>,
    /// MySQL settings, `Some` when `MYSQL_ON` is set
    pub mysql: Option<MySqlConfig>,
    /// MongoDB settings, `Some` when `MONGODB_ON` is set
    pub mongodb: Option<MongoDbConfig>,
    /// Todos domain settings
    pub todos: TodosConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment and the
    /// `.env.{APP_ENV}` file of the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(|key| std::env::var(key).ok(), Path::new("."))
    }

    /// Loads configuration from `lookup`, falling back to the variables of
    /// `dir/.env.{APP_ENV}`.
    ///
    /// `APP_ENV` itself is read from `lookup` only and defaults to
    /// `development`. A missing file is not an error; a malformed one is.
    pub fn from_sources<F>(lookup: F, dir: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("APP_ENV")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| "development".to_string());
        let file = read_env_file(&dir.join(format!(".env.{environment}")))?;

        Self::from_lookup(|key| lookup(key).or_else(|| file.get(key).cloned()))
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let port = match vars.optional("PORT") {
            Some(raw) => {
                let number = raw.parse::<u16>().map_err(|error| ConfigError::Invalid {
                    variable: "PORT",
                    reason: error.to_string(),
                })?;
                ServerPort::try_new(number).map_err(|error| ConfigError::Invalid {
                    variable: "PORT",
                    reason: error.to_string(),
                })?
            }
            None => ServerPort::default(),
        };

        let environment = vars
            .optional("APP_ENV")
            .as_deref()
            .map_or_else(|| Ok(Environment::default()), Environment::parse)?;

        let redis = if vars.switch("REDIS_ON") {
            Some(RedisConfig::validate(vars.required("REDIS_URL")?)?)
        } else {
            None
        };

        let mysql = if vars.switch("MYSQL_ON") {
            Some(MySqlConfig {
                host: vars.required("MYSQL_HOST")?,
                user: vars.required("MYSQL_USER")?,
                password: vars.optional("MYSQL_PASSWORD"),
                database: vars.optional("MYSQL_DATABASE"),
            })
        } else {
            None
        };

        let mongodb = if vars.switch("MONGODB_ON") {
            Some(MongoDbConfig::validate(
                vars.required("MONGODB_URL")?,
                vars.required("MONGODB_DATABASE")?,
            )?)
        } else {
            None
        };

        let todos = Self::todos_section(&vars, mysql.is_some(), mongodb.is_some())?;

        Ok(Self {
            port,
            environment,
            redis,
            mysql,
            mongodb,
            todos,
        })
    }

    fn todos_section<F>(
        vars: &Vars<'_, F>,
        mysql_on: bool,
        mongodb_on: bool,
    ) -> Result<TodosConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TodosConfig::default();

        let store = match vars.optional("TODOS_STORE").as_deref() {
            None => defaults.store,
            Some(raw) if raw.eq_ignore_ascii_case("memory") => TodoStoreKind::Memory,
            Some(raw) if raw.eq_ignore_ascii_case("mysql") => TodoStoreKind::MySql,
            Some(raw) if raw.eq_ignore_ascii_case("mongodb") => TodoStoreKind::MongoDb,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    variable: "TODOS_STORE",
                    reason: format!("unknown store '{other}'"),
                })
            }
        };
        let missing_switch = match store {
            TodoStoreKind::MySql if !mysql_on => Some(("mysql", "MYSQL_ON")),
            TodoStoreKind::MongoDb if !mongodb_on => Some(("mongodb", "MONGODB_ON")),
            _ => None,
        };
        if let Some((name, switch)) = missing_switch {
            return Err(ConfigError::Invalid {
                variable: "TODOS_STORE",
                reason: format!("the {name} store requires {switch}"),
            });
        }

        let table = vars.optional("TODOS_TABLE").unwrap_or(defaults.table);

        let whitelisted_tables = match vars.optional("TODOS_WHITELISTED_TABLES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.whitelisted_tables,
        };

        Ok(TodosConfig {
            store,
            table,
            whitelisted_tables,
        })
    }

    /// A loggable view of the configuration, without credentials.
    pub fn summary(&self) -> Value {
        json!({
            "port": u16::from(self.port),
            "environment": self.environment,
            "redisIsOn": self.redis.is_some(),
            "redis": self.redis.as_ref().map(|redis| json!({ "host": redis.host() })),
            "mysqlIsOn": self.mysql.is_some(),
            "mysql": self.mysql.as_ref().map(|mysql| json!({
                "host": mysql.host,
                "user": mysql.user,
                "database": mysql.database,
            })),
            "mongoIsOn": self.mongodb.is_some(),
            "mongodb": self.mongodb.as_ref().map(|mongodb| json!({
                "host": mongodb.host(),
                "database": mongodb.database,
            })),
            "todos": self.todos,
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let invalid = |error: dotenvy::Error| ConfigError::EnvFile {
        path: path.display().to_string(),
        reason: error.to_string(),
    };

    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.map(|entry| entry.map_err(invalid)).collect(),
        Err(error) if error.not_found() => Ok(HashMap::new()),
        Err(error) => Err(invalid(error)),
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or(ConfigError::Missing { variable: key })
    }

    fn switch(&self, key: &str) -> bool {
        self.optional(key).is_some_and(|value| to_boolean(&value))
    }
}
