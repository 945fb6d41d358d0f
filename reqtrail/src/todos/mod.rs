//! The Todo domain: validation, storage seam and use cases.

pub mod builder;
pub mod controller;
pub mod error;
pub mod repository;
pub mod types;

pub use builder::TodoBuilder;
pub use controller::{OperationOutcome, OutcomeStatus, TodosController};
pub use error::{TodoError, TodoErrorCode};
pub use repository::{validate_table_name, TodoRepository};
pub use types::{NewTodo, Todo, TodoId, TodoTitle, TodoUpdate};

/// Default table holding todos.
pub const TODOS_TABLE: &str = "todos";
