//! Lazy batched relation loading.
//!
//! `lazyrel-loader` is the **orchestration layer**. Resolvers ask a
//! `BatchScope` for one `RelationView` per parent; every view of the same
//! relationship and base query shares a `BatchRegistry`, which runs a single
//! per-parent top-N statement the first time any view needs data and then
//! serves each owner's slice from memory.
//!
//! # Example
//!
//! ```ignore
//! let scope = BatchScope::new(conn);
//! let recent = Select::<Comment>::new().order_by(Expr::col("created_at").desc());
//!
//! let views = posts
//!     .iter()
//!     .map(|post| scope.view_for("comments", recent.clone(), post.clone()))
//!     .collect::<Result<Vec<_>>>()?;
//! views[0].limit(3)?;
//!
//! // one statement for every post
//! let first = views[0].to_list(&cx, scope.connection()).await;
//! ```

pub mod config;
pub mod registry;
pub mod scope;
pub mod view;

pub use config::LoaderConfig;
pub use registry::{BatchRegistry, LoadState, RelationOp, TerminalOp};
pub use scope::BatchScope;
pub use view::{Last, RelationView};
