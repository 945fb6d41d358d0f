//! MySQL adapter for reqtrail
//!
//! [`MySqlClient`] owns the connection pool shared by the application and
//! reports on it through the health endpoint. [`MySqlTodoRepository`] stores
//! todos in a table of that database.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod repository;

pub use client::{MaxConnections, MySqlClient, MySqlError, MySqlPoolConfig};
pub use repository::MySqlTodoRepository;
