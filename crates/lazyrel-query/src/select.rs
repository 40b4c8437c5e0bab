//! SELECT query builder.
//!
//! `Select<M>` is the composable base query the batch loader refines. Every
//! builder method consumes the query and returns the refined copy; nothing
//! executes until a caller renders or runs it.

use crate::cache::fingerprint;
use crate::clause::{Limit, Offset, OrderBy, Where, build_order_list};
use crate::eager::EagerLoader;
use crate::expr::Expr;
use lazyrel_core::{Dialect, Model, Value};
use std::marker::PhantomData;

/// A SELECT query builder.
#[derive(Debug)]
pub struct Select<M: Model> {
    /// Columns to select (empty = all)
    columns: Vec<String>,
    /// WHERE clause conditions
    where_clause: Option<Where>,
    /// ORDER BY clauses
    order_by: Vec<OrderBy>,
    /// LIMIT clause
    limit: Option<Limit>,
    /// OFFSET clause
    offset: Option<Offset>,
    /// Eager loading configuration
    eager_loader: Option<EagerLoader<M>>,
    /// Model type marker
    _marker: PhantomData<M>,
}

impl<M: Model> Clone for Select<M> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            where_clause: self.where_clause.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit.clone(),
            offset: self.offset.clone(),
            eager_loader: self.eager_loader.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> Select<M> {
    /// Create a new SELECT query for the model's table.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            eager_loader: None,
            _marker: PhantomData,
        }
    }

    /// Select specific columns.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|&s| s.to_string()).collect();
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add an OR WHERE condition.
    pub fn or_filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.or(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Reverse the ordering.
    ///
    /// An unordered query is ordered by primary key, descending.
    pub fn reverse_order(mut self) -> Self {
        if self.order_by.is_empty() {
            self.order_by = M::PRIMARY_KEY
                .iter()
                .map(|pk| Expr::col(*pk).desc())
                .collect();
        } else {
            self.order_by = self.order_by.iter().map(OrderBy::reversed).collect();
        }
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Configure eager loading for relationships.
    ///
    /// Hints from repeated calls accumulate.
    pub fn eager(mut self, loader: EagerLoader<M>) -> Self {
        self.eager_loader = Some(match self.eager_loader {
            Some(existing) => existing.merge(loader),
            None => loader,
        });
        self
    }

    // ==================== Accessors ====================

    /// The explicit projection (empty = all columns).
    pub fn selected_columns(&self) -> &[String] {
        &self.columns
    }

    /// The WHERE clause, if any.
    pub fn where_clause(&self) -> Option<&Where> {
        self.where_clause.as_ref()
    }

    /// The ORDER BY terms.
    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// The LIMIT, if any.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit.map(|Limit(n)| n)
    }

    /// The OFFSET, if any.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset.map(|Offset(n)| n)
    }

    /// The eager-loading hints, if any.
    pub fn eager_loader(&self) -> Option<&EagerLoader<M>> {
        self.eager_loader.as_ref()
    }

    // ==================== SQL Generation ====================

    /// Build the SQL query and parameters (default dialect).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the SQL query and parameters for a dialect.
    ///
    /// Eager-loading hints are not rendered here; they only take effect when
    /// the query runs through the batched top-N statement.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        sql.push_str("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(M::TABLE_NAME);

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params, 0));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&build_order_list(&self.order_by, dialect, &mut params, 0));
        }

        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        if let Some(Offset(n)) = self.offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        (sql, params)
    }

    /// Fingerprint of the rendered query, eager hints included.
    pub fn fingerprint(&self) -> u64 {
        let (mut sql, params) = self.build();
        if let Some(loader) = &self.eager_loader {
            sql.push_str(&format!(" /* eager: {:?} */", loader.includes()));
        }
        fingerprint(&sql, &params)
    }
}

impl<M: Model> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}
