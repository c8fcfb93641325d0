//! kvgate - an authenticated REST gateway for key-value storage
//!
//! One HTTP surface over two interchangeable backends: a hosted key-value
//! namespace, or key-value semantics emulated on SQLite.

pub mod auth;
pub mod bulk;
pub mod cli;
pub mod http_server;
pub mod kv;
pub mod observability;
