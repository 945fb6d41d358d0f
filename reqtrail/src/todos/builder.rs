use serde_json::Value;

use super::error::TodoError;
use super::types::{NewTodo, TodoTitle, TodoUpdate};

/// Collects raw request values and validates them into todo payloads.
///
/// Values are taken as untyped JSON because request bodies are untrusted:
/// a title must be a non-empty string and `completed` a boolean.
#[derive(Debug, Clone, Default)]
pub struct TodoBuilder {
    id: Option<String>,
    title: Option<Value>,
    completed: Option<Value>,
}

impl TodoBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder from the `title` and `completed` keys of a request body.
    pub fn from_body(body: &Value) -> Self {
        Self {
            id: None,
            title: body.get("title").cloned(),
            completed: body.get("completed").cloned(),
        }
    }

    /// Sets the id of the todo being updated.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the raw title.
    #[must_use]
    pub fn title(mut self, title: Value) -> Self {
        self.title = Some(title);
        self
    }

    /// Sets the raw completion flag.
    #[must_use]
    pub fn completed(mut self, completed: Value) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Validates the fields of a todo about to be created.
    pub fn build_for_creation(&self) -> Result<NewTodo, TodoError> {
        let title = match &self.title {
            Some(Value::String(raw)) => TodoTitle::try_new(raw.as_str()).map_err(|error| {
                TodoError::Validation {
                    reason: format!("title: {error}"),
                }
            })?,
            _ => {
                return Err(TodoError::Validation {
                    reason: "title must be a non-empty string".to_string(),
                })
            }
        };

        let completed = match &self.completed {
            Some(Value::Bool(completed)) => *completed,
            _ => {
                return Err(TodoError::Validation {
                    reason: "completed must be a boolean".to_string(),
                })
            }
        };

        Ok(NewTodo { title, completed })
    }

    /// Validates a full replacement of an existing todo.
    pub fn build(&self) -> Result<TodoUpdate, TodoError> {
        let fields = self.build_for_creation()?;
        let id = self.id.clone().ok_or_else(|| TodoError::Validation {
            reason: "id is required".to_string(),
        })?;
        Ok(TodoUpdate { id, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reason(result: Result<NewTodo, TodoError>) -> String {
        match result {
            Err(TodoError::Validation { reason }) => reason,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_body_builds_a_new_todo() {
        let todo = TodoBuilder::from_body(&json!({ "title": " Test ", "completed": false }))
            .build_for_creation()
            .unwrap();
        assert_eq!(todo.title.as_ref(), "Test");
        assert!(!todo.completed);
    }

    #[test]
    fn title_must_be_a_non_empty_string() {
        for title in [json!(""), json!("   "), json!(7), json!(null), json!(["a"])] {
            let result = TodoBuilder::new()
                .title(title.clone())
                .completed(json!(true))
                .build_for_creation();
            assert!(reason(result).starts_with("title"), "{title} should be rejected");
        }

        let result = TodoBuilder::from_body(&json!({ "completed": true })).build_for_creation();
        assert!(reason(result).starts_with("title"));
    }

    #[test]
    fn completed_must_be_a_boolean() {
        for completed in [json!("true"), json!(1), json!(null)] {
            let result = TodoBuilder::new()
                .title(json!("Test"))
                .completed(completed)
                .build_for_creation();
            assert_eq!(reason(result), "completed must be a boolean");
        }

        let result = TodoBuilder::from_body(&json!({ "title": "Test" })).build_for_creation();
        assert_eq!(reason(result), "completed must be a boolean");
    }

    #[test]
    fn non_object_bodies_fail_validation() {
        for body in [json!(null), json!("text"), json!([1, 2])] {
            assert!(TodoBuilder::from_body(&body).build_for_creation().is_err());
        }
    }

    #[test]
    fn build_carries_the_id() {
        let update = TodoBuilder::from_body(&json!({ "title": "Test", "completed": true }))
            .id("abc")
            .build()
            .unwrap();
        assert_eq!(update.id, "abc");
        assert!(update.fields.completed);

        let missing = TodoBuilder::from_body(&json!({ "title": "Test", "completed": true })).build();
        assert!(matches!(missing, Err(TodoError::Validation { .. })));
    }
}
