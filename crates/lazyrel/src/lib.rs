//! lazyrel - lazy, batched top-N relation loading.
//!
//! Resolvers that walk a list of parents and ask each one for "its latest N
//! children" would normally issue one query per parent. lazyrel defers those
//! reads, collects every parent that asks for the same relationship with the
//! same base query, and answers all of them with one statement that keeps only
//! the top N children per parent.
//!
//! # Quick Start
//!
//! ```ignore
//! use lazyrel::prelude::*;
//!
//! async fn latest_comments(
//!     cx: &Cx,
//!     scope: &BatchScope<impl Connection>,
//!     posts: &[Post],
//! ) -> Vec<Vec<Comment>> {
//!     let base = Select::<Comment>::new().order_by(Expr::col("created_at").desc());
//!
//!     // No I/O: each view registers its post with the shared batch.
//!     let views: Vec<_> = posts
//!         .iter()
//!         .map(|p| scope.view_for("comments", base.clone(), p.clone()).unwrap())
//!         .collect();
//!     views[0].limit(3).unwrap();
//!
//!     // The first read runs one statement for every post.
//!     let mut out = Vec::new();
//!     for view in &views {
//!         match view.to_list(cx, scope.connection()).await {
//!             Outcome::Ok(comments) => out.push(comments),
//!             _ => out.push(Vec::new()),
//!         }
//!     }
//!     out
//! }
//! ```
//!
//! # Crates
//!
//! - `lazyrel-core`: values, rows, `Model`, relationship metadata, `Connection`
//! - `lazyrel-query`: `Select`, `Expr`, eager hints, `TopNQuery`
//! - `lazyrel-loader`: `BatchRegistry`, `RelationView`, `BatchScope`

pub use lazyrel_core::{
    ColumnInfo, ConfigError, Connection, ConnectionError, ConnectionErrorKind, Cx, Dialect, Error,
    FieldInfo, FromValue, KeyValue, LinkTableInfo, Model, Outcome, QueryError, QueryErrorKind,
    Related, RelationError, RelationErrorKind, RelationshipInfo, RelationshipKind, Result, Row,
    TypeError, Value, find_relationship,
};
pub use lazyrel_loader::{
    BatchRegistry, BatchScope, Last, LoadState, LoaderConfig, RelationOp, RelationView,
    TerminalOp,
};
pub use lazyrel_query::{
    Batched, EagerJoin, EagerLoader, Expr, IncludePath, NullsOrder, OrderBy, OrderDirection,
    PARENT_PK_COLUMN, Select, TopNQuery, TopNStrategy, cache_key,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        // Loader
        BatchRegistry,
        BatchScope,
        // Core traits and types
        Connection,
        Cx,
        Dialect,
        // Query building
        EagerLoader,
        Error,
        Expr,
        FieldInfo,
        Last,
        LoaderConfig,
        Model,
        OrderBy,
        Outcome,
        Related,
        RelationView,
        RelationshipInfo,
        RelationshipKind,
        Result,
        Row,
        Select,
        TopNStrategy,
        Value,
    };
}
