//! Batch registries.
//!
//! A `BatchRegistry` collects the parents that share one relationship and one
//! base query, accepts refinements of that query until it loads, runs the
//! batched top-N statement once, and serves every owner's partition from the
//! memoized result.
//!
//! # State
//!
//! ```text
//! NotLoaded --load()--> Loaded(records)
//!     ^                      (terminal)
//!     +-- failed load rolls back
//! ```
//!
//! Composition (`register`, `apply`) is rejected with `QueryFrozen` once a
//! load has started. A load that fails, is cancelled, or panics leaves the
//! registry `NotLoaded` and open again, so the caller may retry.

use crate::config::LoaderConfig;
use asupersync::sync::{LockError, Mutex as LoadGate};
use asupersync::{CancelReason, Cx, Outcome};
use lazyrel_core::{
    ConfigError, Connection, Dialect, Error, KeyValue, Model, RelationError, RelationshipInfo,
    Result, Value, find_relationship,
};
use lazyrel_query::{Batched, EagerLoader, Expr, OrderBy, Select, TopNQuery};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A composition operation accepted before the batch loads.
#[derive(Debug, Clone)]
pub enum RelationOp<C: Model> {
    Filter(Expr),
    OrFilter(Expr),
    OrderBy(OrderBy),
    ReverseOrder,
    Limit(u64),
    Offset(u64),
    EagerLoad(EagerLoader<C>),
}

impl<C: Model> RelationOp<C> {
    /// Operation name used in errors and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            RelationOp::Filter(_) => "filter",
            RelationOp::OrFilter(_) => "or_filter",
            RelationOp::OrderBy(_) => "order_by",
            RelationOp::ReverseOrder => "reverse_order",
            RelationOp::Limit(_) => "limit",
            RelationOp::Offset(_) => "offset",
            RelationOp::EagerLoad(_) => "with_eager_load",
        }
    }

    fn refine(self, query: Select<C>) -> Select<C> {
        match self {
            RelationOp::Filter(expr) => query.filter(expr),
            RelationOp::OrFilter(expr) => query.or_filter(expr),
            RelationOp::OrderBy(order) => query.order_by(order),
            RelationOp::ReverseOrder => query.reverse_order(),
            RelationOp::Limit(n) => query.limit(n),
            RelationOp::Offset(n) => query.offset(n),
            RelationOp::EagerLoad(loader) => query.eager(loader),
        }
    }
}

/// Operations that would need the whole batch to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOp {
    Count,
    Exists,
    First,
}

impl TerminalOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            TerminalOp::Count => "count",
            TerminalOp::Exists => "exists",
            TerminalOp::First => "first",
        }
    }
}

/// Load state of a registry.
#[derive(Debug)]
pub enum LoadState<C> {
    NotLoaded,
    /// Records in statement order, assigned once.
    Loaded(Arc<[Batched<C>]>),
}

struct RegistryState<P: Model, C: Model> {
    parents: Vec<P>,
    parent_keys: Vec<Value>,
    query: TopNQuery<P, C>,
    load: LoadState<C>,
    loading: bool,
}

impl<P: Model, C: Model> RegistryState<P, C> {
    fn is_frozen(&self) -> bool {
        self.loading || matches!(self.load, LoadState::Loaded(_))
    }
}

/// Shared orchestrator for one relationship and one base-query lineage.
pub struct BatchRegistry<P: Model, C: Model> {
    relationship: &'static RelationshipInfo,
    config: LoaderConfig,
    state: Mutex<RegistryState<P, C>>,
    /// child key -> parent key
    back_refs: Mutex<HashMap<KeyValue, KeyValue>>,
    gate: LoadGate<()>,
}

impl<P: Model, C: Model> std::fmt::Debug for BatchRegistry<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("BatchRegistry")
            .field("relationship", &self.relationship.name)
            .field("parents", &state.parents.len())
            .field("loaded", &matches!(state.load, LoadState::Loaded(_)))
            .field("loading", &state.loading)
            .finish_non_exhaustive()
    }
}

impl<P, C> BatchRegistry<P, C>
where
    P: Model + Clone,
    C: Model + Clone,
{
    /// Create a registry for `relationship` over `base_query`.
    ///
    /// Fails with `UnsupportedRelationship` when the relationship cannot be
    /// batched by a single foreign key.
    pub fn new(
        relationship: &'static RelationshipInfo,
        base_query: Select<C>,
        config: LoaderConfig,
    ) -> Result<Self> {
        let query = TopNQuery::new(relationship, base_query)?
            .with_strategy(config.strategy)
            .with_default_limit(config.default_limit);

        tracing::debug!(
            relationship = relationship.name,
            parent = P::TABLE_NAME,
            table = C::TABLE_NAME,
            "Created batch registry"
        );

        Ok(Self {
            relationship,
            config,
            state: Mutex::new(RegistryState {
                parents: Vec::new(),
                parent_keys: Vec::new(),
                query,
                load: LoadState::NotLoaded,
                loading: false,
            }),
            back_refs: Mutex::new(HashMap::new()),
            gate: LoadGate::new(()),
        })
    }

    /// Create a registry for the relationship of `P` called `name`.
    pub fn named(name: &str, base_query: Select<C>, config: LoaderConfig) -> Result<Self> {
        let Some(relationship) = find_relationship::<P>(name) else {
            return Err(Error::Relation(RelationError::unsupported(
                name,
                format!("'{}' has no relationship named '{}'", P::TABLE_NAME, name),
            )));
        };
        Self::new(relationship, base_query, config)
    }

    pub fn relationship(&self) -> &'static RelationshipInfo {
        self.relationship
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, RegistryState<P, C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn frozen(&self, operation: &'static str) -> Error {
        Error::Relation(RelationError::frozen(self.relationship.name, operation))
    }

    /// Add a parent to the batch.
    pub fn register(&self, parent: P) -> Result<()> {
        let mut state = self.state();
        if state.is_frozen() {
            return Err(self.frozen("register"));
        }
        if let Some(max) = self.config.max_parents {
            if state.parents.len() >= max {
                return Err(Error::Config(ConfigError {
                    message: format!(
                        "batch for relationship '{}' is limited to {} parents",
                        self.relationship.name, max
                    ),
                    source: None,
                }));
            }
        }
        let key = state.query.parent_key_column();
        state.parent_keys.push(parent_key_of(&parent, key));
        state.parents.push(parent);
        tracing::trace!(
            relationship = self.relationship.name,
            parent_count = state.parents.len(),
            "Registered parent"
        );
        Ok(())
    }

    /// Refine the shared base query.
    ///
    /// On error the query is unchanged.
    pub fn apply(&self, op: RelationOp<C>) -> Result<()> {
        let mut state = self.state();
        if state.is_frozen() {
            return Err(self.frozen(op.name()));
        }
        let name = op.name();
        let base = match op {
            RelationOp::ReverseOrder => state.query.ordered_query(),
            _ => state.query.query().clone(),
        };
        let refined = op.refine(base);
        state.query.replace_query(refined)?;
        tracing::trace!(
            relationship = self.relationship.name,
            operation = name,
            "Refined batch query"
        );
        Ok(())
    }

    /// Reject a terminal operation unless the batch has loaded.
    ///
    /// The load state is never changed.
    pub fn guard_terminal(&self, op: TerminalOp) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(Error::Relation(RelationError::premature(
                self.relationship.name,
                op.as_str(),
            )))
        }
    }

    /// The memoized records, if loaded.
    pub fn records(&self) -> Option<Arc<[Batched<C>]>> {
        match &self.state().load {
            LoadState::Loaded(records) => Some(Arc::clone(records)),
            LoadState::NotLoaded => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state().load, LoadState::Loaded(_))
    }

    /// Whether composition is still accepted.
    pub fn is_frozen(&self) -> bool {
        self.state().is_frozen()
    }

    pub fn parent_count(&self) -> usize {
        self.state().parents.len()
    }

    /// The statement a load would run now.
    pub fn query_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let state = self.state();
        state.query.build(dialect, &state.parent_keys)
    }

    /// Run the batched statement once and memoize the result.
    ///
    /// Later calls return the memoized records without I/O. Concurrent
    /// callers wait for the first load to finish.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, conn),
        fields(relationship = self.relationship.name)
    )]
    pub async fn load<Cn: Connection>(
        &self,
        cx: &Cx,
        conn: &Cn,
    ) -> Outcome<Arc<[Batched<C>]>, Error> {
        if let Some(records) = self.records() {
            tracing::debug!(row_count = records.len(), "Batch cache hit");
            return Outcome::Ok(records);
        }

        let _gate = match self.gate.lock(cx).await {
            Ok(gate) => gate,
            Err(LockError::Cancelled) => {
                tracing::debug!("Load cancelled while waiting for the gate");
                return Outcome::Cancelled(
                    cx.cancel_reason()
                        .unwrap_or_else(|| CancelReason::user("load gate wait cancelled")),
                );
            }
            Err(LockError::Poisoned) => {
                return Outcome::Err(Error::Custom(format!(
                    "load gate poisoned for relationship '{}'",
                    self.relationship.name
                )));
            }
        };

        if let Some(records) = self.records() {
            tracing::debug!(row_count = records.len(), "Batch loaded while waiting");
            return Outcome::Ok(records);
        }

        let (query, keys) = {
            let mut state = self.state();
            state.loading = true;
            (state.query.clone(), state.parent_keys.clone())
        };
        let mut loading = LoadingFlag {
            state: &self.state,
            armed: true,
        };

        let outcome = query.execute(cx, conn, &keys).await;
        match outcome {
            Outcome::Ok(rows) => {
                let records: Arc<[Batched<C>]> = rows.into();
                {
                    let mut state = self.state();
                    state.load = LoadState::Loaded(Arc::clone(&records));
                    state.loading = false;
                }
                loading.armed = false;
                tracing::debug!(
                    parent_count = keys.len(),
                    row_count = records.len(),
                    "Batch loaded"
                );
                Outcome::Ok(records)
            }
            Outcome::Err(e) => {
                tracing::warn!(error = %e, "Batch load failed; registry left unloaded");
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                tracing::warn!("Batch load cancelled; registry left unloaded");
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                tracing::warn!("Batch load panicked; registry left unloaded");
                Outcome::Panicked(p)
            }
        }
    }

    /// Load the batch and return `owner`'s children in statement order.
    ///
    /// An owner that was never registered gets an empty list.
    pub async fn for_owner<Cn: Connection>(
        &self,
        cx: &Cx,
        conn: &Cn,
        owner: &P,
    ) -> Outcome<Vec<C>, Error> {
        let records = match self.load(cx, conn).await {
            Outcome::Ok(records) => records,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        Outcome::Ok(self.partition(&records, owner))
    }

    /// `owner`'s children from the memoized records, without I/O.
    ///
    /// Returns `None` before the batch has loaded.
    pub fn cached_for_owner(&self, owner: &P) -> Option<Vec<C>> {
        self.records().map(|records| self.partition(&records, owner))
    }

    fn partition(&self, records: &[Batched<C>], owner: &P) -> Vec<C> {
        let owner_key = self.owner_key(owner).key();
        let children: Vec<C> = records
            .iter()
            .filter(|b| b.parent_key.key() == owner_key)
            .map(|b| b.record.clone())
            .collect();

        if self.config.back_references {
            let mut back_refs = self.back_refs.lock().unwrap_or_else(PoisonError::into_inner);
            for child in &children {
                if let Some(child_key) = child_key_of(child) {
                    back_refs.insert(child_key, owner_key.clone());
                }
            }
        }

        tracing::debug!(
            relationship = self.relationship.name,
            row_count = children.len(),
            "Partitioned batch for owner"
        );
        children
    }

    /// The registered parent a partitioned child belongs to.
    ///
    /// Answers from the back-reference table; never runs a query.
    pub fn parent_of(&self, child: &C) -> Option<P> {
        let child_key = child_key_of(child)?;
        let parent_key = self
            .back_refs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&child_key)
            .cloned()?;
        let state = self.state();
        state
            .parents
            .iter()
            .zip(&state.parent_keys)
            .find(|(_, key)| key.key() == parent_key)
            .map(|(parent, _)| parent.clone())
    }

    fn owner_key(&self, owner: &P) -> Value {
        let state = self.state();
        parent_key_of(owner, state.query.parent_key_column())
    }
}

/// Resets the loading flag if a load does not complete.
///
/// Covers error outcomes as well as the load future being dropped.
struct LoadingFlag<'a, P: Model, C: Model> {
    state: &'a Mutex<RegistryState<P, C>>,
    armed: bool,
}

impl<P: Model, C: Model> Drop for LoadingFlag<'_, P, C> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.loading = false;
        }
    }
}

fn parent_key_of<P: Model>(parent: &P, column: &str) -> Value {
    if let [pk] = P::PRIMARY_KEY {
        if *pk == column {
            if let [value] = parent.primary_key_value().as_slice() {
                return value.clone();
            }
        }
    }
    parent.column_value(column).unwrap_or(Value::Null)
}

fn child_key_of<C: Model>(child: &C) -> Option<KeyValue> {
    match child.primary_key_value().as_slice() {
        [value] if !value.is_null() => Some(value.key()),
        _ => None,
    }
}
