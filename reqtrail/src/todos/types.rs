//! Todo domain types.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// Identifier of a stored todo.
///
/// Todo ids are time ordered (version 7) UUIDs so listing by id follows
/// creation order.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a fresh id.
    pub fn new() -> Self {
        // Uuid::now_v7() always yields a version 7 uuid
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a v7 UUID")
    }

    /// Parses an id received from a client.
    pub fn parse(raw: &str) -> Result<Self, RepositoryError> {
        let uuid = Uuid::parse_str(raw.trim()).map_err(|_| RepositoryError::InvalidId)?;
        Self::try_new(uuid).map_err(|_| RepositoryError::InvalidId)
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

/// Title of a todo: trimmed, non-empty, at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TodoTitle(String);

/// A stored todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Identifier
    pub id: TodoId,
    /// What to do
    pub title: TodoTitle,
    /// Whether it is done
    pub completed: bool,
    /// When the todo was inserted
    pub created_at: DateTime<Utc>,
    /// When the todo was last written
    pub updated_at: DateTime<Utc>,
}

/// Validated client-writable fields of a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    /// What to do
    pub title: TodoTitle,
    /// Whether it is done
    pub completed: bool,
}

/// A validated replacement for the fields of an existing todo.
///
/// The id is kept as received; repositories reject malformed ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoUpdate {
    /// Id as sent by the client
    pub id: String,
    /// New field values
    #[serde(flatten)]
    pub fields: NewTodo,
}
