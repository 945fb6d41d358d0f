//! End-to-end tests of the todo REST API over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use reqtrail::config::TodosConfig;
use reqtrail::errors::{RepositoryError, RepositoryResult};
use reqtrail::todos::{NewTodo, Todo, TodoId, TodoRepository, TodosController, TODOS_TABLE};
use reqtrail::Environment;
use reqtrail_memory::InMemoryTodoRepository;
use reqtrail_server::{create_app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(environment: Environment, repository: Arc<dyn TodoRepository>) -> Router {
    let todos = TodosController::initialize(&TodosConfig::default(), repository).unwrap();
    create_app(AppState::new(environment, todos))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn todo_lifecycle() {
    let repository = Arc::new(InMemoryTodoRepository::new());
    let app = app_with(Environment::Test, repository.clone());

    let created = call(
        &app,
        "POST",
        "/api/v1/todos",
        Some(json!({ "title": "Write tests", "completed": false })),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json_body(created).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(repository.len(), 1);

    let fetched = call(&app, "GET", &format!("/api/v1/todos/{id}"), None).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = json_body(fetched).await;
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["title"], "Write tests");
    assert_eq!(body["data"]["completed"], false);
    assert!(body["data"]["createdAt"].is_string());

    let updated = call(
        &app,
        "PUT",
        &format!("/api/v1/todos/{id}"),
        Some(json!({ "title": "Write more tests", "completed": true })),
    )
    .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(json_body(updated).await["data"]["id"], id.as_str());

    let listed = json_body(call(&app, "GET", "/api/v1/todos", None).await).await;
    let todos = listed["data"].as_array().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0]["title"], "Write more tests");
    assert_eq!(todos[0]["completed"], true);

    let deleted = call(&app, "DELETE", &format!("/api/v1/todos/{id}"), None).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert!(repository.is_empty());

    let gone = call(&app, "GET", &format!("/api/v1/todos/{id}"), None).await;
    assert_eq!(gone.status(), StatusCode::NO_CONTENT);
    let again = call(&app, "DELETE", &format!("/api/v1/todos/{id}"), None).await;
    assert_eq!(again.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn invalid_bodies_are_rejected_with_the_validation_code() {
    let app = app_with(Environment::Development, Arc::new(InMemoryTodoRepository::new()));

    for body in [
        json!({ "title": "", "completed": false }),
        json!({ "title": "Missing flag" }),
        json!({ "title": 7, "completed": true }),
        json!({ "title": "Flag as string", "completed": "yes" }),
    ] {
        let response = call(&app, "POST", "/api/v1/todos", Some(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["metadata"]["message"], "FAILED");
        assert_eq!(body["metadata"]["error"]["code"], 1001);
    }
}

#[tokio::test]
async fn updating_a_missing_todo_fails_with_the_update_code() {
    let app = app_with(Environment::Development, Arc::new(InMemoryTodoRepository::new()));

    let response = call(
        &app,
        "PUT",
        &format!("/api/v1/todos/{}", TodoId::new()),
        Some(json!({ "title": "Nobody home", "completed": false })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["metadata"]["error"]["code"], 1003);
}

#[tokio::test]
async fn malformed_ids_fail_with_the_general_code() {
    let app = app_with(Environment::Development, Arc::new(InMemoryTodoRepository::new()));

    let response = call(&app, "GET", "/api/v1/todos/not-a-uuid", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["metadata"]["error"]["code"], 1111);
    assert_eq!(
        body["metadata"]["transactionId"].as_str().unwrap().len(),
        36
    );
}

/// Store whose every call fails as if the database were down.
struct OfflineRepository;

#[async_trait]
impl TodoRepository for OfflineRepository {
    fn table(&self) -> &str {
        TODOS_TABLE
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Todo>> {
        Err(RepositoryError::ConnectionFailed("store offline".to_string()))
    }

    async fn get_by_id(&self, _id: &str) -> RepositoryResult<Option<Todo>> {
        Err(RepositoryError::ConnectionFailed("store offline".to_string()))
    }

    async fn insert_with_timestamps(&self, _todo: &NewTodo) -> RepositoryResult<Option<TodoId>> {
        Err(RepositoryError::ConnectionFailed("store offline".to_string()))
    }

    async fn update_with_timestamps(&self, _id: &str, _todo: &NewTodo) -> RepositoryResult<u64> {
        Err(RepositoryError::ConnectionFailed("store offline".to_string()))
    }

    async fn remove(&self, _id: &str) -> RepositoryResult<u64> {
        Err(RepositoryError::ConnectionFailed("store offline".to_string()))
    }
}

#[tokio::test]
async fn store_failures_become_general_errors() {
    let app = app_with(Environment::Development, Arc::new(OfflineRepository));

    let response = call(&app, "GET", "/api/v1/todos", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["metadata"]["message"], "FAILED");
    assert_eq!(body["metadata"]["error"]["code"], 1111);
    assert!(body.get("data").is_none());

    let response = call(
        &app,
        "POST",
        "/api/v1/todos",
        Some(json!({ "title": "Lost", "completed": false })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn production_hides_error_codes() {
    let app = app_with(Environment::Production, Arc::new(OfflineRepository));

    let body = json_body(call(&app, "GET", "/api/v1/todos", None).await).await;
    assert_eq!(body["metadata"]["message"], "FAILED");
    assert!(body["metadata"].get("error").is_none());
}
