use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::error::ErrorKind;
use mongodb::{Collection, Database};
use reqtrail::errors::{RepositoryError, RepositoryResult};
use reqtrail::todos::{validate_table_name, NewTodo, Todo, TodoId, TodoRepository, TodoTitle};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// Shape of a todo in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    completed: bool,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl TryFrom<TodoDocument> for Todo {
    type Error = RepositoryError;

    fn try_from(document: TodoDocument) -> RepositoryResult<Self> {
        Ok(Self {
            id: TodoId::parse(&document.id)?,
            title: TodoTitle::try_new(document.title)
                .map_err(|error| RepositoryError::Query(format!("stored title: {error}")))?,
            completed: document.completed,
            created_at: from_bson(document.created_at)?,
            updated_at: from_bson(document.updated_at)?,
        })
    }
}

fn to_bson(timestamp: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(timestamp.timestamp_millis())
}

fn from_bson(timestamp: bson::DateTime) -> RepositoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp.timestamp_millis()).ok_or_else(|| {
        RepositoryError::Query(format!("stored timestamp out of range: {timestamp}"))
    })
}

/// Todos stored as documents of a MongoDB collection.
///
/// The document `_id` is the hyphenated todo id, so ids stay valid across
/// every store.
#[derive(Debug, Clone)]
pub struct MongoDbTodoRepository {
    database: Database,
    collection: Collection<TodoDocument>,
    table: String,
}

impl MongoDbTodoRepository {
    /// Binds to a collection; the name is validated but not looked up.
    pub fn new(database: &Database, table: &str) -> RepositoryResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            database: database.clone(),
            collection: database.collection(table),
            table: table.to_string(),
        })
    }

    async fn collection_exists(&self) -> RepositoryResult<bool> {
        let names = self
            .database
            .list_collection_names()
            .await
            .map_err(|error| map_mongo_error(&error, "initialize"))?;
        Ok(names.iter().any(|name| name == &self.table))
    }

    /// Fails with [`RepositoryError::MissingTable`] unless the collection
    /// exists in the database.
    #[instrument(name = "mongodb.initialize", skip(self), fields(collection = %self.table))]
    pub async fn initialize(&self) -> RepositoryResult<()> {
        if !self.collection_exists().await? {
            return Err(RepositoryError::MissingTable(self.table.clone()));
        }
        info!("todo collection found");
        Ok(())
    }

    /// Creates the collection if it does not exist yet.
    #[instrument(name = "mongodb.migrate", skip(self), fields(collection = %self.table))]
    pub async fn migrate(&self) -> RepositoryResult<()> {
        if !self.collection_exists().await? {
            self.database
                .create_collection(&self.table)
                .await
                .map_err(|error| map_mongo_error(&error, "migrate"))?;
        }
        info!("todo collection ready");
        Ok(())
    }
}

fn map_mongo_error(error: &mongodb::error::Error, operation: &str) -> RepositoryError {
    error!(error = %error, operation, "[mongodb.database_error] database operation failed");
    match *error.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            RepositoryError::ConnectionFailed(error.to_string())
        }
        _ => RepositoryError::Query(error.to_string()),
    }
}

#[async_trait]
impl TodoRepository for MongoDbTodoRepository {
    fn table(&self) -> &str {
        &self.table
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Todo>> {
        let documents: Vec<TodoDocument> = self
            .collection
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .await
            .map_err(|error| map_mongo_error(&error, "get_all"))?
            .try_collect()
            .await
            .map_err(|error| map_mongo_error(&error, "get_all"))?;
        documents.into_iter().map(Todo::try_from).collect()
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Option<Todo>> {
        let id = TodoId::parse(id)?;
        self.collection
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|error| map_mongo_error(&error, "get_by_id"))?
            .map(Todo::try_from)
            .transpose()
    }

    async fn insert_with_timestamps(&self, todo: &NewTodo) -> RepositoryResult<Option<TodoId>> {
        let id = TodoId::new();
        let now = to_bson(Utc::now());
        let document = TodoDocument {
            id: id.to_string(),
            title: todo.title.to_string(),
            completed: todo.completed,
            created_at: now,
            updated_at: now,
        };

        let result = self
            .collection
            .insert_one(&document)
            .await
            .map_err(|error| map_mongo_error(&error, "insert_with_timestamps"))?;

        debug!(collection = %self.table, %id, "inserted todo");
        Ok(result.inserted_id.as_str().and_then(|raw| TodoId::parse(raw).ok()))
    }

    async fn update_with_timestamps(&self, id: &str, todo: &NewTodo) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        let update = doc! {
            "$set": {
                "title": todo.title.to_string(),
                "completed": todo.completed,
                "updatedAt": to_bson(Utc::now()),
            }
        };

        let result = self
            .collection
            .update_one(doc! { "_id": id.to_string() }, update)
            .await
            .map_err(|error| map_mongo_error(&error, "update_with_timestamps"))?;
        Ok(result.matched_count)
    }

    async fn remove(&self, id: &str) -> RepositoryResult<u64> {
        let id = TodoId::parse(id)?;
        let result = self
            .collection
            .delete_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|error| map_mongo_error(&error, "remove"))?;
        Ok(result.deleted_count)
    }
}
