use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::RepositoryError;
use crate::response::ErrorCode;

/// Numeric codes reported in `metadata.error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TodoErrorCode {
    /// Anything not covered by a more specific code
    GeneralError = 1111,
    /// Request body failed validation
    TodoValidationError = 1001,
    /// The store did not return an id for an inserted todo
    TodoInsertIntoDbError = 1002,
    /// The store did not match exactly one todo on update
    TodoUpdateOnDbError = 1003,
}

impl TodoErrorCode {
    /// The numeric value.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Failures of the todos domain.
#[derive(Debug, Error)]
pub enum TodoError {
    /// The request body did not describe a valid todo.
    #[error("Todo validation failed.")]
    Validation {
        /// What was wrong with the body
        reason: String,
    },

    /// The store accepted an insert but returned no id.
    #[error("Create Todo failed.")]
    InsertFailed,

    /// The update did not match exactly one todo.
    #[error("Update Todo failed.")]
    UpdateFailed {
        /// Id the client asked to update
        id: String,
        /// How many todos matched
        matched: u64,
    },

    /// The configured table is not whitelisted.
    #[error("Invalid table name {0}")]
    InvalidTable(String),

    /// The repository failed.
    #[error("Todos Controller Operation Failed: {0}")]
    Operation(#[from] RepositoryError),
}

impl TodoError {
    /// Code reported to clients.
    pub const fn error_code(&self) -> TodoErrorCode {
        match self {
            Self::Validation { .. } => TodoErrorCode::TodoValidationError,
            Self::InsertFailed => TodoErrorCode::TodoInsertIntoDbError,
            Self::UpdateFailed { .. } => TodoErrorCode::TodoUpdateOnDbError,
            Self::InvalidTable(_) | Self::Operation(_) => TodoErrorCode::GeneralError,
        }
    }
}

impl ErrorCode for TodoError {
    fn code(&self) -> u16 {
        self.error_code().as_u16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_published_values() {
        assert_eq!(TodoErrorCode::GeneralError.as_u16(), 1111);
        assert_eq!(TodoErrorCode::TodoValidationError.as_u16(), 1001);
        assert_eq!(TodoErrorCode::TodoInsertIntoDbError.as_u16(), 1002);
        assert_eq!(TodoErrorCode::TodoUpdateOnDbError.as_u16(), 1003);
    }

    #[test]
    fn every_error_maps_to_its_code() {
        let cases = [
            (
                TodoError::Validation {
                    reason: "title".to_string(),
                },
                1001,
            ),
            (TodoError::InsertFailed, 1002),
            (
                TodoError::UpdateFailed {
                    id: "x".to_string(),
                    matched: 0,
                },
                1003,
            ),
            (TodoError::InvalidTable("users".to_string()), 1111),
            (TodoError::Operation(RepositoryError::InvalidId), 1111),
        ];

        for (error, code) in cases {
            assert_eq!(error.code(), code, "{error}");
        }
    }

    #[test]
    fn repository_failures_are_prefixed() {
        let error = TodoError::from(RepositoryError::InvalidId);
        assert_eq!(
            error.to_string(),
            "Todos Controller Operation Failed: Invalid ID format."
        );
    }
}
