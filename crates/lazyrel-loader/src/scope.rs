//! Request-scoped registry store.
//!
//! A `BatchScope` lives for one unit of work. Views requested for the same
//! relationship and the same base query share a registry; dropping the scope
//! drops every registry and its cached records.

use crate::config::LoaderConfig;
use crate::registry::BatchRegistry;
use crate::view::RelationView;
use lazyrel_core::{Connection, Error, Model, Result};
use lazyrel_query::Select;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// (parent type, child type, relationship name, base query fingerprint)
type ScopeKey = (TypeId, TypeId, String, u64);

type AnyRegistry = Arc<dyn Any + Send + Sync>;

/// Registries for one unit of work, plus the connection they load through.
pub struct BatchScope<Cn: Connection> {
    conn: Cn,
    config: LoaderConfig,
    registries: Mutex<HashMap<ScopeKey, AnyRegistry>>,
}

impl<Cn: Connection> BatchScope<Cn> {
    /// Create a scope with the default configuration.
    pub fn new(conn: Cn) -> Self {
        Self::with_config(conn, LoaderConfig::default())
    }

    /// Create a scope with a custom configuration.
    pub fn with_config(conn: Cn, config: LoaderConfig) -> Self {
        Self {
            conn,
            config,
            registries: Mutex::new(HashMap::new()),
        }
    }

    /// The connection views in this scope load through.
    pub fn connection(&self) -> &Cn {
        &self.conn
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of registries created so far.
    pub fn registry_count(&self) -> usize {
        self.registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The registry for `relationship` of `P` over `base_query`, created on
    /// first use.
    pub fn registry<P, C>(
        &self,
        relationship: &str,
        base_query: Select<C>,
    ) -> Result<Arc<BatchRegistry<P, C>>>
    where
        P: Model + Clone + 'static,
        C: Model + Clone + 'static,
    {
        let key: ScopeKey = (
            TypeId::of::<P>(),
            TypeId::of::<C>(),
            relationship.to_string(),
            base_query.fingerprint(),
        );

        let mut registries = self
            .registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = registries.get(&key) {
            return Arc::clone(existing)
                .downcast::<BatchRegistry<P, C>>()
                .map_err(|_| {
                    Error::Custom(format!(
                        "registry for relationship '{relationship}' has an unexpected type"
                    ))
                });
        }

        let registry = Arc::new(BatchRegistry::<P, C>::named(
            relationship,
            base_query,
            self.config.clone(),
        )?);
        registries.insert(key, Arc::clone(&registry) as AnyRegistry);
        tracing::debug!(
            relationship = relationship,
            registries = registries.len(),
            "Opened batch in scope"
        );
        Ok(registry)
    }

    /// Register `parent` with the shared registry and return its view.
    ///
    /// No I/O happens here.
    pub fn view_for<P, C>(
        &self,
        relationship: &str,
        base_query: Select<C>,
        parent: P,
    ) -> Result<RelationView<P, C>>
    where
        P: Model + Clone + 'static,
        C: Model + Clone + 'static,
    {
        let registry = self.registry::<P, C>(relationship, base_query)?;
        registry.register(parent.clone())?;
        Ok(RelationView::new(registry, parent))
    }
}

impl<Cn: Connection> std::fmt::Debug for BatchScope<Cn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("config", &self.config)
            .field("registries", &self.registry_count())
            .finish_non_exhaustive()
    }
}
