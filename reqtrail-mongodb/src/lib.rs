//! MongoDB adapter for reqtrail
//!
//! [`MongoDbClient`] owns the driver's connection pool and reports on it
//! through the health endpoint. [`MongoDbTodoRepository`] stores todos as
//! documents of one collection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod repository;

pub use client::{MongoDbClient, MongoDbClientOptions, MongoDbError};
pub use repository::MongoDbTodoRepository;
