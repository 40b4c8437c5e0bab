//! Query construction for lazyrel.
//!
//! `lazyrel-query` is the **statement layer**. It provides the composable
//! `Select<M>` base query that batch registries refine, the expression DSL
//! used in filters and orderings, eager-loading hints, and `TopNQuery`, which
//! renders and runs the single per-parent top-N statement for a batch.
//!
//! # Role In The Architecture
//!
//! - **Base queries**: `Select<M>` records filters, ordering, limit, offset,
//!   projection and eager hints without executing.
//! - **Expression DSL**: `Expr` builds WHERE and ORDER BY fragments with bound
//!   parameters.
//! - **Top-N statements**: `TopNQuery` chooses a lateral-join or
//!   window-function rendering per `Dialect`.
//!
//! Statements run through the `Connection` trait from `lazyrel-core`.

pub mod cache;
pub mod clause;
pub mod eager;
pub mod expr;
pub mod select;
pub mod topn;

pub use cache::{cache_key, fingerprint};
pub use clause::{Limit, NullsOrder, Offset, OrderBy, OrderDirection, Where};
pub use eager::{EagerJoin, EagerLoader, IncludePath};
pub use expr::{BinaryOp, Expr};
pub use lazyrel_core::Dialect;
pub use select::Select;
pub use topn::{Batched, PARENT_PK_COLUMN, TopNQuery, TopNStrategy};
