//! Building blocks for services that call stored procedures.
//!
//! An instrumented data-access wrapper over PostgreSQL, SQLite and (behind
//! the `oracle` feature) Oracle, a batching file logger, masked card and
//! social security number types, declarative validation, a connection
//! string cipher and an in-process metrics registry.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod validation;

pub use config::{Config, Settings};
pub use error::{Error, Result};
