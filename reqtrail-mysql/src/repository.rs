use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use reqtrail::errors::{RepositoryError, RepositoryResult};
use reqtrail::todos::{validate_table_name, NewTodo, Todo, TodoId, TodoRepository, TodoTitle};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{query, query_scalar, Row};
use tracing::{debug, error, info, instrument};

/// Todos stored in a MySQL table.
///
/// Ids are stored as their hyphenated string form so they stay readable in
/// the database and sort by creation time.
#[derive(Debug, Clone)]
pub struct MySqlTodoRepository {
    pool: MySqlPool,
    table: String,
}

impl MySqlTodoRepository {
    /// Wraps a pool; the table name is validated but not looked up.
    pub fn new(pool: MySqlPool, table: &str) -> RepositoryResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// The pool queries run on.
    pub const fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Fails with [`RepositoryError::MissingTable`] unless the table exists
    /// in the connection's current database.
    #[instrument(name = "mysql.initialize", skip(self), fields(table = %self.table))]
    pub async fn initialize(&self) -> RepositoryResult<()> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, "initialize"))?;

        if count == 0 {
            return Err(RepositoryError::MissingTable(self.table.clone()));
        }
        info!("todo table found");
        Ok(())
    }

    /// Creates the table if it does not exist yet.
    #[instrument(name = "mysql.migrate", skip(self), fields(table = %self.table))]
    pub async fn migrate(&self) -> RepositoryResult<()> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (\
                id CHAR(36) NOT NULL PRIMARY KEY, \
                title VARCHAR(255) NOT NULL, \
                completed BOOLEAN NOT NULL, \
                created_at DATETIME(6) NOT NULL, \
                updated_at DATETIME(6) NOT NULL\
            )",
            self.table
        );
        query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "migrate"))?;
        info!("todo table ready");
        Ok(())
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, title, completed, created_at, updated_at FROM `{}`",
            self.table
        )
    }
}

fn todo_from_row(row: &MySqlRow) -> RepositoryResult<Todo> {
    let decode = |error: sqlx::Error| RepositoryError::Query(error.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let title: String = row.try_get("title").map_err(decode)?;
    let created_at: NaiveDateTime = row.try_get("created_at").map_err(decode)?;
    let updated_at: NaiveDateTime = row.try_get("updated_at").map_err(decode)?;

    Ok(Todo {
        id: TodoId::parse(&id)?,
        title: TodoTitle::try_new(title)
            .map_err(|error| RepositoryError::Query(format!("stored title: {error}")))?,
        completed: row.try_get("completed").map_err(decode)?,
        created_at: created_at.and_utc(),
        updated_at: updated_at.and_utc(),
    })
}

fn map_sqlx_error(error: sqlx::Error, operation: &str) -> RepositoryError {
    error!(error = %error, operation, "[mysql.database_error] database operation failed");
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => RepositoryError::ConnectionFailed(error.to_string()),
        other => RepositoryError::Query(other.to_string()),
    }
}

#[async_trait]
impl TodoRepository for MySqlTodoRepository {
    fn table(&self) -> &str {
        &self.table
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Todo>> {
        let statement = format!("{} ORDER BY id", self.select_columns());
        let rows = query(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "get_all"))?;
        rows.iter().map(todo_from_row).collect()
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Option<Todo>> {
        let id = TodoId::parse(id)?;
        let statement = format!("{} WHERE id = ?", self.select_columns());
        let row = query(&statement)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "get_by_id"))?;
        row.as_ref().map(todo_from_row).transpose()
    }

    async fn insert_with_timestamps(&self, todo: &NewTodo) -> RepositoryResult<Option<TodoId>> {
        let id = TodoId::new();
        let now = Utc::now().naive_utc();
        let statement = format!(
            "INSERT INTO `{}` (id, title, completed, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            self.table
        );

        let result = query(&statement)
            .bind(id.to_string())
            .bind(todo.title.as_ref())
            .bind(todo.completed)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "insert_with_timestamps"))?;

        debug!(table = %self.table, %id, rows = result.rows_affected(), "inserted todo");
        Ok((result.rows_affected() == 1).then_some(id))
    }

    async fn update_with_timestamps(&self, id: &str, todo: &NewTodo) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        let statement = format!(
            "UPDATE `{}` SET title = ?, completed = ?, updated_at = ? WHERE id = ?",
            self.table
        );

        let result = query(&statement)
            .bind(todo.title.as_ref())
            .bind(todo.completed)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "update_with_timestamps"))?;
        Ok(result.rows_affected())
    }

    async fn remove(&self, id: &str) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        let statement = format!("DELETE FROM `{}` WHERE id = ?", self.table);

        let result = query(&statement)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "remove"))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MySqlClient;
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::ContainerAsync;
    use testcontainers_modules::mysql::Mysql;

    fn lazy_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://root@127.0.0.1:1/devel")
            .unwrap()
    }

    /// Throwaway MySQL server; stopped when the handle is dropped.
    async fn mysql_container() -> (ContainerAsync<Mysql>, MySqlPool) {
        let container = Mysql::default()
            .start()
            .await
            .expect("should start mysql container");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("should get mysql port");
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect(&format!("mysql://root@127.0.0.1:{port}/test"))
            .await
            .expect("should connect to mysql container");
        (container, pool)
    }

    fn new_todo(title: &str, completed: bool) -> NewTodo {
        NewTodo {
            title: TodoTitle::try_new(title).unwrap(),
            completed,
        }
    }

    #[tokio::test]
    async fn table_names_are_validated() {
        assert!(MySqlTodoRepository::new(lazy_pool(), "todos").is_ok());
        assert!(matches!(
            MySqlTodoRepository::new(lazy_pool(), "todos`; DROP TABLE users"),
            Err(RepositoryError::InvalidTable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_ids_fail_before_touching_the_database() {
        let repository = MySqlTodoRepository::new(lazy_pool(), "todos").unwrap();
        assert!(matches!(
            repository.get_by_id("nope").await,
            Err(RepositoryError::InvalidId)
        ));
        assert!(matches!(
            repository.remove("42").await,
            Err(RepositoryError::InvalidId)
        ));
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connection_failure() {
        let repository = MySqlTodoRepository::new(lazy_pool(), "todos").unwrap();
        assert!(matches!(
            repository.get_all().await,
            Err(RepositoryError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn round_trip_against_mysql() {
        let (_container, pool) = mysql_container().await;
        let table = format!("todos_test_{}", TodoId::new().simple());
        let repository = MySqlTodoRepository::new(pool, &table).unwrap();

        assert!(matches!(
            repository.initialize().await,
            Err(RepositoryError::MissingTable(_))
        ));
        repository.migrate().await.unwrap();
        repository.initialize().await.unwrap();

        let id = repository
            .insert_with_timestamps(&new_todo("Test", false))
            .await
            .unwrap()
            .unwrap()
            .to_string();
        let stored = repository.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_ref(), "Test");
        assert!(!stored.completed);
        assert_eq!(stored.created_at, stored.updated_at);

        assert_eq!(
            repository
                .update_with_timestamps(&id, &new_todo("Updated", true))
                .await
                .unwrap(),
            1
        );
        let listed = repository.get_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title.as_ref(), "Updated");
        assert!(listed[0].completed);
        assert!(listed[0].updated_at >= listed[0].created_at);
        assert_eq!(
            repository
                .update_with_timestamps(&TodoId::new().to_string(), &new_todo("Nobody", true))
                .await
                .unwrap(),
            0
        );
        assert_eq!(repository.remove(&id).await.unwrap(), 1);
        assert!(repository.get_by_id(&id).await.unwrap().is_none());

        let client = MySqlClient::from_pool(repository.pool().clone());
        assert_eq!(client.healthcheck().await, "mySqlClient OK");
        client.close().await;
        assert_eq!(client.healthcheck().await, "mySqlClient ERROR");
    }
}
