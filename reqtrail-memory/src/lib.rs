//! In-memory todo repository for reqtrail
//!
//! This crate provides an in-memory implementation of the `TodoRepository`
//! trait from the reqtrail crate, useful for development and tests where
//! persistence is not required. Everything is lost when the process exits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqtrail::errors::RepositoryResult;
use reqtrail::todos::{validate_table_name, NewTodo, Todo, TodoId, TodoRepository, TODOS_TABLE};
use tracing::debug;

/// Thread-safe in-memory todo store
#[derive(Debug, Clone)]
pub struct InMemoryTodoRepository {
    table: String,
    // Ordered by id, and v7 ids sort by creation time
    todos: Arc<RwLock<BTreeMap<TodoId, Todo>>>,
}

impl InMemoryTodoRepository {
    /// Create an empty store for the default `todos` table
    pub fn new() -> Self {
        Self {
            table: TODOS_TABLE.to_string(),
            todos: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Create an empty store under another table name
    pub fn with_table(table: &str) -> RepositoryResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            table: table.to_string(),
            ..Self::new()
        })
    }

    /// Number of stored todos
    pub fn len(&self) -> usize {
        self.todos.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.todos.read().is_empty()
    }
}

impl Default for InMemoryTodoRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    fn table(&self) -> &str {
        &self.table
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Todo>> {
        Ok(self.todos.read().values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Option<Todo>> {
        let id = TodoId::parse(id)?;
        Ok(self.todos.read().get(&id).cloned())
    }

    async fn insert_with_timestamps(&self, todo: &NewTodo) -> RepositoryResult<Option<TodoId>> {
        let now = chrono::Utc::now();
        let id = TodoId::new();

        self.todos.write().insert(
            id,
            Todo {
                id,
                title: todo.title.clone(),
                completed: todo.completed,
                created_at: now,
                updated_at: now,
            },
        );

        debug!(table = %self.table, %id, "inserted todo");
        Ok(Some(id))
    }

    async fn update_with_timestamps(&self, id: &str, todo: &NewTodo) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        let mut todos = self.todos.write();

        let Some(stored) = todos.get_mut(&id) else {
            return Ok(0);
        };
        stored.title = todo.title.clone();
        stored.completed = todo.completed;
        stored.updated_at = chrono::Utc::now();

        Ok(1)
    }

    async fn remove(&self, id: &str) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        Ok(u64::from(self.todos.write().remove(&id).is_some()))
    }
}
