//! Todo use cases, independent of the HTTP framework.
//!
//! Each operation returns an [`OperationOutcome`] that the transport layer
//! turns into a status code and a response envelope. Repository failures
//! never escape: they are logged and reported as a general error.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::builder::TodoBuilder;
use super::error::TodoError;
use super::repository::TodoRepository;
use crate::config::TodosConfig;
use crate::errors::RepositoryError;
use crate::logging::AppLogger;

/// Status of an operation, in HTTP terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// 200
    Ok,
    /// 201
    Created,
    /// 204
    NoContent,
    /// 400
    BadRequest,
    /// 500
    InternalServerError,
}

impl OutcomeStatus {
    /// The HTTP status code.
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::InternalServerError => 500,
        }
    }
}

/// Result of one controller operation.
#[derive(Debug)]
pub struct OperationOutcome {
    /// What went wrong, `None` on success
    pub error: Option<TodoError>,
    /// Status to answer with
    pub status: OutcomeStatus,
    /// Payload, if any
    pub data: Option<Value>,
}

impl OperationOutcome {
    fn success(status: OutcomeStatus, data: Option<Value>) -> Self {
        Self {
            error: None,
            status,
            data,
        }
    }

    fn failure(status: OutcomeStatus, error: TodoError) -> Self {
        Self {
            error: Some(error),
            status,
            data: None,
        }
    }

    /// Whether the operation failed.
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs todo operations against a repository.
#[derive(Clone)]
pub struct TodosController {
    repository: Arc<dyn TodoRepository>,
    logger: AppLogger,
}

impl std::fmt::Debug for TodosController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodosController")
            .field("table", &self.repository.table())
            .finish_non_exhaustive()
    }
}

impl TodosController {
    /// Creates a controller after checking the configured table is whitelisted.
    pub fn initialize(
        config: &TodosConfig,
        repository: Arc<dyn TodoRepository>,
    ) -> Result<Self, TodoError> {
        let table = repository.table();
        if table != config.table || !config.whitelisted_tables.iter().any(|name| name == table) {
            return Err(TodoError::InvalidTable(table.to_string()));
        }

        Ok(Self {
            repository,
            logger: AppLogger::new("todos"),
        })
    }

    /// Runs an operation, turning repository failures into a general error.
    pub async fn handle_operation<F>(&self, operation: F) -> OperationOutcome
    where
        F: Future<Output = Result<OperationOutcome, RepositoryError>>,
    {
        match operation.await {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = TodoError::from(error);
                self.logger.error_with(&error.to_string(), &error);
                OperationOutcome::failure(OutcomeStatus::InternalServerError, error)
            }
        }
    }

    fn fail(&self, status: OutcomeStatus, error: TodoError) -> OperationOutcome {
        self.logger.error(
            &error.to_string(),
            &json!({ "code": error.error_code().as_u16(), "details": format!("{error:?}") }),
        );
        OperationOutcome::failure(status, error)
    }

    /// Lists every todo.
    pub async fn get_all(&self) -> OperationOutcome {
        self.handle_operation(self.list_todos()).await
    }

    /// Fetches one todo; 204 when it does not exist.
    pub async fn get_by_id(&self, id: &str) -> OperationOutcome {
        self.handle_operation(self.fetch_todo(id)).await
    }

    /// Creates a todo from a request body, answering with its id.
    pub async fn create(&self, body: &Value) -> OperationOutcome {
        self.handle_operation(self.insert_todo(body)).await
    }

    /// Replaces a todo's fields, answering with its id.
    pub async fn update(&self, id: &str, body: &Value) -> OperationOutcome {
        self.handle_operation(self.replace_todo(id, body)).await
    }

    /// Deletes a todo; 204 when nothing was deleted.
    pub async fn delete_by_id(&self, id: &str) -> OperationOutcome {
        self.handle_operation(self.remove_todo(id)).await
    }

    async fn list_todos(&self) -> Result<OperationOutcome, RepositoryError> {
        let todos = self.repository.get_all().await?;
        Ok(OperationOutcome::success(
            OutcomeStatus::Ok,
            Some(serde_json::to_value(todos)?),
        ))
    }

    async fn fetch_todo(&self, id: &str) -> Result<OperationOutcome, RepositoryError> {
        Ok(match self.repository.get_by_id(id).await? {
            Some(todo) => {
                OperationOutcome::success(OutcomeStatus::Ok, Some(serde_json::to_value(todo)?))
            }
            None => OperationOutcome::success(OutcomeStatus::NoContent, None),
        })
    }

    async fn insert_todo(&self, body: &Value) -> Result<OperationOutcome, RepositoryError> {
        let todo = match TodoBuilder::from_body(body).build_for_creation() {
            Ok(todo) => todo,
            Err(error) => return Ok(self.fail(OutcomeStatus::BadRequest, error)),
        };

        let Some(id) = self.repository.insert_with_timestamps(&todo).await? else {
            return Ok(self.fail(OutcomeStatus::InternalServerError, TodoError::InsertFailed));
        };

        self.logger
            .debug("Todo created", &json!({ "id": id.to_string() }));
        Ok(OperationOutcome::success(
            OutcomeStatus::Created,
            Some(json!({ "id": id.to_string() })),
        ))
    }

    async fn replace_todo(&self, id: &str, body: &Value) -> Result<OperationOutcome, RepositoryError> {
        let update = match TodoBuilder::from_body(body).id(id).build() {
            Ok(update) => update,
            Err(error) => return Ok(self.fail(OutcomeStatus::BadRequest, error)),
        };

        let matched = self
            .repository
            .update_with_timestamps(&update.id, &update.fields)
            .await?;

        if matched == 1 {
            return Ok(OperationOutcome::success(
                OutcomeStatus::Ok,
                Some(json!({ "id": update.id })),
            ));
        }

        Ok(self.fail(
            OutcomeStatus::InternalServerError,
            TodoError::UpdateFailed {
                id: update.id,
                matched,
            },
        ))
    }

    async fn remove_todo(&self, id: &str) -> Result<OperationOutcome, RepositoryError> {
        let deleted = self.repository.remove(id).await?;
        let status = if deleted > 0 {
            OutcomeStatus::Ok
        } else {
            OutcomeStatus::NoContent
        };
        Ok(OperationOutcome::success(status, None))
    }
}
