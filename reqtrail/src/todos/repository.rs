use async_trait::async_trait;

use super::types::{NewTodo, Todo, TodoId};
use crate::errors::{RepositoryError, RepositoryResult};

/// Storage seam of the todos domain.
///
/// Ids arrive as the raw strings clients sent; implementations reject
/// malformed ones with [`RepositoryError::InvalidId`].
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// Name of the backing table.
    fn table(&self) -> &str;

    /// Every stored todo, oldest first.
    async fn get_all(&self) -> RepositoryResult<Vec<Todo>>;

    /// The todo with the given id, if any.
    async fn get_by_id(&self, id: &str) -> RepositoryResult<Option<Todo>>;

    /// Stores a todo with `createdAt` and `updatedAt` set to now.
    ///
    /// Returns the id of the stored todo, `None` if the store did not report one.
    async fn insert_with_timestamps(&self, todo: &NewTodo) -> RepositoryResult<Option<TodoId>>;

    /// Replaces the fields of a todo and refreshes `updatedAt`.
    ///
    /// Returns how many todos matched the id.
    async fn update_with_timestamps(&self, id: &str, todo: &NewTodo) -> RepositoryResult<u64>;

    /// Deletes a todo, returning how many were removed.
    async fn remove(&self, id: &str) -> RepositoryResult<u64>;
}

/// Checks a table name is safe to splice into SQL.
///
/// Names must be 1 to 64 ASCII letters, digits or underscores and must not
/// start with a digit.
pub fn validate_table_name(name: &str) -> RepositoryResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTable(name.to_string()))
    }
}
