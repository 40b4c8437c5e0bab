//! Core types and traits for lazyrel.
//!
//! This crate provides the foundational abstractions the batched relation
//! loader is built on:
//!
//! - `Model` trait for struct-to-table mapping
//! - `RelationshipInfo` static relationship metadata
//! - `Connection` trait for statement execution
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod field;
pub mod model;
pub mod relationship;
pub mod row;
pub mod value;

pub use connection::{Connection, Dialect};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind,
    RelationError, RelationErrorKind, Result, TypeError,
};
pub use field::FieldInfo;
pub use model::{Model, find_relationship};
pub use relationship::{LinkTableInfo, Related, RelationshipInfo, RelationshipKind};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::{KeyValue, Value};
