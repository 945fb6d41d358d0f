//! Integration tests for `reqtrail`
//!
//! This crate contains integration tests that drive the HTTP router, the
//! execution context tracker and the todo stores together.

// This is a test-only crate
#![cfg(test)]
