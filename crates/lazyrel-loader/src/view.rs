//! Per-owner relation views.
//!
//! A `RelationView` is what callers hold for "the children of this parent".
//! Composition calls go to the shared registry; reads load the batch once and
//! return this owner's slice of it.

use crate::registry::{BatchRegistry, RelationOp, TerminalOp};
use asupersync::{Cx, Outcome};
use lazyrel_core::{Connection, Error, Model, Result};
use lazyrel_query::{EagerLoader, Expr, OrderBy};
use std::sync::Arc;

/// Result of [`RelationView::last`].
#[derive(Debug, Clone, PartialEq)]
pub enum Last<C> {
    /// `last(1)`: the final record, if any.
    One(Option<C>),
    /// `last(n)` for `n != 1`: up to `n` records in forward order.
    Many(Vec<C>),
}

impl<C> Last<C> {
    /// Flatten into a list.
    pub fn into_vec(self) -> Vec<C> {
        match self {
            Last::One(record) => record.into_iter().collect(),
            Last::Many(records) => records,
        }
    }
}

/// A relation scoped to one owner, backed by a shared batch registry.
pub struct RelationView<P: Model, C: Model> {
    registry: Arc<BatchRegistry<P, C>>,
    owner: P,
}

impl<P: Model + Clone, C: Model> Clone for RelationView<P, C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            owner: self.owner.clone(),
        }
    }
}

impl<P: Model + std::fmt::Debug, C: Model> std::fmt::Debug for RelationView<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationView")
            .field("owner", &self.owner)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<P, C> RelationView<P, C>
where
    P: Model + Clone,
    C: Model + Clone,
{
    /// Create a view for `owner`. The owner is not registered here.
    pub fn new(registry: Arc<BatchRegistry<P, C>>, owner: P) -> Self {
        Self { registry, owner }
    }

    pub fn owner(&self) -> &P {
        &self.owner
    }

    pub fn registry(&self) -> &Arc<BatchRegistry<P, C>> {
        &self.registry
    }

    // ==================== Composition ====================

    pub fn filter(&self, expr: Expr) -> Result<&Self> {
        self.registry.apply(RelationOp::Filter(expr))?;
        Ok(self)
    }

    pub fn or_filter(&self, expr: Expr) -> Result<&Self> {
        self.registry.apply(RelationOp::OrFilter(expr))?;
        Ok(self)
    }

    pub fn order_by(&self, order: OrderBy) -> Result<&Self> {
        self.registry.apply(RelationOp::OrderBy(order))?;
        Ok(self)
    }

    pub fn limit(&self, n: u64) -> Result<&Self> {
        self.registry.apply(RelationOp::Limit(n))?;
        Ok(self)
    }

    pub fn offset(&self, n: u64) -> Result<&Self> {
        self.registry.apply(RelationOp::Offset(n))?;
        Ok(self)
    }

    /// Add eager-loading hints for every child in the batch.
    ///
    /// Only single-valued relationships of `C` are accepted.
    pub fn with_eager_load(&self, loader: EagerLoader<C>) -> Result<&Self> {
        self.registry.apply(RelationOp::EagerLoad(loader))?;
        Ok(self)
    }

    // ==================== Materialization ====================

    /// This owner's children, loading the batch on first use.
    pub async fn to_list<Cn: Connection>(&self, cx: &Cx, conn: &Cn) -> Outcome<Vec<C>, Error> {
        self.registry.for_owner(cx, conn, &self.owner).await
    }

    /// The single child of a one-to-one relation, if any.
    pub async fn to_one<Cn: Connection>(&self, cx: &Cx, conn: &Cn) -> Outcome<Option<C>, Error> {
        match self.to_list(cx, conn).await {
            Outcome::Ok(children) => Outcome::Ok(children.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// The last `n` children per the current ordering.
    ///
    /// Reverses the shared ordering and limits it to `n` before loading, so it
    /// fails with `QueryFrozen` once the batch has loaded. `last(1)` yields a
    /// single optional record; other counts yield a list in forward order.
    pub async fn last<Cn: Connection>(
        &self,
        cx: &Cx,
        conn: &Cn,
        n: u64,
    ) -> Outcome<Last<C>, Error> {
        if let Err(e) = self
            .registry
            .apply(RelationOp::ReverseOrder)
            .and_then(|()| self.registry.apply(RelationOp::Limit(n)))
        {
            return Outcome::Err(e);
        }

        let mut children = match self.to_list(cx, conn).await {
            Outcome::Ok(children) => children,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        if n == 1 {
            Outcome::Ok(Last::One(children.into_iter().next()))
        } else {
            children.reverse();
            Outcome::Ok(Last::Many(children))
        }
    }

    // ==================== Terminal (post-load only) ====================

    /// Number of children of this owner.
    ///
    /// Fails with `PrematureExecution` before the batch has loaded.
    pub fn count(&self) -> Result<usize> {
        Ok(self.loaded_children(TerminalOp::Count)?.len())
    }

    /// Whether this owner has any children.
    ///
    /// Fails with `PrematureExecution` before the batch has loaded.
    pub fn exists(&self) -> Result<bool> {
        Ok(!self.loaded_children(TerminalOp::Exists)?.is_empty())
    }

    /// This owner's first child.
    ///
    /// Fails with `PrematureExecution` before the batch has loaded.
    pub fn first(&self) -> Result<Option<C>> {
        Ok(self
            .loaded_children(TerminalOp::First)?
            .into_iter()
            .next())
    }

    fn loaded_children(&self, op: TerminalOp) -> Result<Vec<C>> {
        self.registry.guard_terminal(op)?;
        self.registry
            .cached_for_owner(&self.owner)
            .ok_or_else(|| Error::Custom(format!("batch unloaded during `{}`", op.as_str())))
    }
}
