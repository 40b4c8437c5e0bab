//! Error types for lazyrel operations.

use std::fmt;

/// The primary error type for all lazyrel operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors reported by a driver
    Connection(ConnectionError),
    /// Statement execution errors reported by a driver
    Query(QueryError),
    /// Type conversion errors while hydrating rows
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// Batched relation loading errors
    Relation(RelationError),
    /// Operation timed out
    Timeout,
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
    /// Connection pool exhausted
    PoolExhausted,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// An error raised by the batch registry, its per-owner views, or the
/// top-N statement builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationError {
    pub kind: RelationErrorKind,
    /// Relationship name the error was raised for.
    pub relationship: String,
    /// The operation that was rejected, if any.
    pub operation: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationErrorKind {
    /// A terminal or aggregate operation was requested before the batch was loaded.
    PrematureExecution,
    /// The relationship cannot be expressed as a single foreign-key correlation.
    UnsupportedRelationship,
    /// A composition operation was requested after loading began.
    QueryFrozen,
}

impl RelationError {
    /// A terminal operation ran against an unloaded batch.
    pub fn premature(relationship: impl Into<String>, operation: &'static str) -> Self {
        Self {
            kind: RelationErrorKind::PrematureExecution,
            relationship: relationship.into(),
            operation: Some(operation),
            message: format!(
                "`{operation}` would execute the batched query before every owner was registered; \
                 materialize the relation with `to_list` first"
            ),
        }
    }

    /// The relationship shape is not a single foreign-key correlation.
    pub fn unsupported(relationship: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RelationErrorKind::UnsupportedRelationship,
            relationship: relationship.into(),
            operation: None,
            message: message.into(),
        }
    }

    /// A composition operation arrived after the query was frozen.
    pub fn frozen(relationship: impl Into<String>, operation: &'static str) -> Self {
        Self {
            kind: RelationErrorKind::QueryFrozen,
            relationship: relationship.into(),
            operation: Some(operation),
            message: format!("`{operation}` cannot change a batch that has already been loaded"),
        }
    }
}

impl Error {
    /// Is this a retryable error (deadlock, serialization, pool exhausted, timeouts)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization | QueryErrorKind::Timeout
            ),
            Error::Connection(c) => matches!(c.kind, ConnectionErrorKind::PoolExhausted),
            Error::Timeout => true,
            _ => false,
        }
    }

    /// Get the relation error payload, if this is one.
    pub fn relation(&self) -> Option<&RelationError> {
        match self {
            Error::Relation(r) => Some(r),
            _ => None,
        }
    }

    /// Was a terminal operation requested before the batch was loaded?
    pub fn is_premature_execution(&self) -> bool {
        self.relation()
            .is_some_and(|r| r.kind == RelationErrorKind::PrematureExecution)
    }

    /// Was the relationship rejected as not batchable?
    pub fn is_unsupported_relationship(&self) -> bool {
        self.relation()
            .is_some_and(|r| r.kind == RelationErrorKind::UnsupportedRelationship)
    }

    /// Was a composition rejected because the batch is frozen?
    pub fn is_query_frozen(&self) -> bool {
        self.relation()
            .is_some_and(|r| r.kind == RelationErrorKind::QueryFrozen)
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Relation(e) => write!(f, "Relation error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Relation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RelationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationErrorKind::PrematureExecution => "premature execution",
            RelationErrorKind::UnsupportedRelationship => "unsupported relationship",
            RelationErrorKind::QueryFrozen => "query frozen",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on relationship '{}': {}",
            self.kind, self.relationship, self.message
        )
    }
}

impl std::error::Error for RelationError {}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<RelationError> for Error {
    fn from(err: RelationError) -> Self {
        Error::Relation(err)
    }
}

/// Result type alias for lazyrel operations.
pub type Result<T> = std::result::Result<T, Error>;
