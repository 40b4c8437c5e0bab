//! Per-parent top-N statements.
//!
//! `TopNQuery` turns a child base query plus a list of parent keys into one
//! statement that returns, for every parent, at most `limit` children in the
//! base query's order. Two renderings are available:
//!
//! - **Lateral**: a derived table of parent keys `CROSS JOIN LATERAL` the base
//!   query restricted to one key (Postgres, MySQL 8).
//! - **Window function**: the base query numbered with
//!   `ROW_NUMBER() OVER (PARTITION BY fk ...)` and cut at the limit (SQLite and
//!   anything without `LATERAL`).
//!
//! Every returned row carries the key it was fetched for in the
//! `__parent_pk` column.

use crate::clause::{OrderBy, build_order_list};
use crate::eager::EagerJoin;
use crate::expr::Expr;
use crate::select::Select;
use asupersync::{Cx, Outcome};
use lazyrel_core::{
    Connection, Dialect, Error, Model, QueryError, QueryErrorKind, RelationError,
    RelationshipInfo, RelationshipKind, Result, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::marker::PhantomData;

/// Column carrying the parent key on every returned row.
pub const PARENT_PK_COLUMN: &str = "__parent_pk";

const PARENT_KEY_ALIAS: &str = "__parent_key";
const KEYS_ALIAS: &str = "parent_keys";
const ROW_NUMBER_ALIAS: &str = "__row_number";

/// How the per-parent limit is expressed in SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopNStrategy {
    /// Lateral join where the dialect supports it, window function otherwise.
    #[default]
    Auto,
    /// `CROSS JOIN LATERAL` against the derived parent-key table.
    Lateral,
    /// `ROW_NUMBER()` partitioned by the foreign key.
    WindowFunction,
}

impl TopNStrategy {
    /// The concrete strategy for a dialect.
    pub const fn resolve(self, dialect: Dialect) -> Self {
        match self {
            TopNStrategy::Auto => {
                if dialect.supports_lateral() {
                    TopNStrategy::Lateral
                } else {
                    TopNStrategy::WindowFunction
                }
            }
            other => other,
        }
    }

    /// Name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            TopNStrategy::Auto => "auto",
            TopNStrategy::Lateral => "lateral",
            TopNStrategy::WindowFunction => "window_function",
        }
    }
}

/// A child record paired with the parent key it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct Batched<C> {
    pub parent_key: Value,
    pub record: C,
}

/// Builder and executor for the batched top-N statement.
#[derive(Debug, Clone)]
pub struct TopNQuery<P: Model, C: Model> {
    relationship: &'static RelationshipInfo,
    parent_key_column: &'static str,
    foreign_key: &'static str,
    query: Select<C>,
    /// Parsed from the relationship's declared `order_by`.
    default_ordering: Vec<OrderBy>,
    joins: Vec<EagerJoin>,
    strategy: TopNStrategy,
    default_limit: Option<u64>,
    _parent: PhantomData<fn() -> P>,
}

impl<P: Model, C: Model> TopNQuery<P, C> {
    /// Validate the relationship and prepare a statement for `query`.
    ///
    /// Fails with `UnsupportedRelationship` unless the relationship is a
    /// one-to-many or one-to-one association correlated by a single foreign
    /// key on `C` against a single key column on `P`. Eager-loading hints on
    /// `query` and the relationship's default ordering are resolved here as
    /// well; a malformed default ordering is an `Error::Config`.
    pub fn new(relationship: &'static RelationshipInfo, query: Select<C>) -> Result<Self> {
        let unsupported =
            |msg: String| Error::Relation(RelationError::unsupported(relationship.name, msg));

        if relationship.link_table.is_some()
            || relationship.kind == RelationshipKind::ManyToMany
        {
            return Err(unsupported(format!(
                "relationship '{}' goes through a link table and cannot be batched by a single \
                 foreign key",
                relationship.name
            )));
        }
        if !matches!(
            relationship.kind,
            RelationshipKind::OneToMany | RelationshipKind::OneToOne
        ) {
            return Err(unsupported(format!(
                "relationship '{}' is {:?}; only one-to-many and one-to-one relationships can be \
                 batched per parent",
                relationship.name, relationship.kind
            )));
        }
        if relationship.related_table != C::TABLE_NAME {
            return Err(unsupported(format!(
                "relationship '{}' targets '{}' but the query selects from '{}'",
                relationship.name,
                relationship.related_table,
                C::TABLE_NAME
            )));
        }

        let foreign_key = match relationship.remote_key_cols() {
            [fk] => *fk,
            [] => {
                return Err(unsupported(format!(
                    "relationship '{}' has no foreign key on '{}'",
                    relationship.name,
                    C::TABLE_NAME
                )));
            }
            _ => {
                return Err(unsupported(format!(
                    "relationship '{}' uses a composite foreign key",
                    relationship.name
                )));
            }
        };

        let parent_key_column = match (relationship.local_key, P::PRIMARY_KEY) {
            (Some(key), _) => key,
            (None, [pk]) => *pk,
            (None, _) => {
                return Err(unsupported(format!(
                    "'{}' does not have a single-column primary key",
                    P::TABLE_NAME
                )));
            }
        };

        let default_ordering = relationship
            .order_by
            .map_or_else(|| Ok(Vec::new()), OrderBy::parse)?;
        let joins = resolve_joins(&query)?;

        tracing::debug!(
            relationship = relationship.name,
            table = C::TABLE_NAME,
            foreign_key = foreign_key,
            parent_key = parent_key_column,
            eager_joins = joins.len(),
            "Prepared top-N query"
        );

        Ok(Self {
            relationship,
            parent_key_column,
            foreign_key,
            query,
            default_ordering,
            joins,
            strategy: TopNStrategy::Auto,
            default_limit: None,
            _parent: PhantomData,
        })
    }

    /// Choose the SQL strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: TopNStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Per-parent limit used when the base query has none.
    #[must_use]
    pub fn with_default_limit(mut self, limit: Option<u64>) -> Self {
        self.default_limit = limit;
        self
    }

    /// Replace the base query, re-resolving its eager-loading hints.
    ///
    /// On error the current query is kept.
    pub fn replace_query(&mut self, query: Select<C>) -> Result<()> {
        self.joins = resolve_joins(&query)?;
        self.query = query;
        Ok(())
    }

    pub fn relationship(&self) -> &'static RelationshipInfo {
        self.relationship
    }

    pub fn query(&self) -> &Select<C> {
        &self.query
    }

    /// Foreign-key column on the child table.
    pub fn foreign_key(&self) -> &'static str {
        self.foreign_key
    }

    /// Key column on the parent table the foreign key references.
    pub fn parent_key_column(&self) -> &'static str {
        self.parent_key_column
    }

    pub fn strategy(&self) -> TopNStrategy {
        self.strategy
    }

    pub fn eager_joins(&self) -> &[EagerJoin] {
        &self.joins
    }

    /// Per-parent limit in effect.
    pub fn effective_limit(&self) -> Option<u64> {
        self.query.limit_value().or(self.default_limit)
    }

    /// Ordering in effect: the base query's, else the relationship default.
    pub fn effective_ordering(&self) -> &[OrderBy] {
        if self.query.ordering().is_empty() {
            &self.default_ordering
        } else {
            self.query.ordering()
        }
    }

    /// The base query with the ordering in effect written into it.
    ///
    /// Refinements that depend on the current order, such as reversing it,
    /// start from this query so the relationship default is not lost.
    pub fn ordered_query(&self) -> Select<C> {
        if !self.query.ordering().is_empty() {
            return self.query.clone();
        }
        self.default_ordering
            .iter()
            .cloned()
            .fold(self.query.clone(), Select::order_by)
    }

    /// Render the statement for `parent_keys`.
    ///
    /// Null keys are skipped and duplicates removed (first occurrence wins).
    /// With no keys left the statement matches nothing.
    pub fn build(&self, dialect: Dialect, parent_keys: &[Value]) -> (String, Vec<Value>) {
        self.render(dialect, &distinct_keys(parent_keys))
    }

    /// Run the statement and decode every row.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, conn, parent_keys),
        fields(relationship = self.relationship.name, table = C::TABLE_NAME)
    )]
    pub async fn execute<Cn: Connection>(
        &self,
        cx: &Cx,
        conn: &Cn,
        parent_keys: &[Value],
    ) -> Outcome<Vec<Batched<C>>, Error> {
        let dialect = conn.dialect();
        let keys = distinct_keys(parent_keys);
        let strategy = self.strategy.resolve(dialect);
        let (sql, params) = self.render(dialect, &keys);

        tracing::info!(
            relationship = self.relationship.name,
            table = C::TABLE_NAME,
            parent_count = keys.len(),
            strategy = strategy.as_str(),
            limit = ?self.effective_limit(),
            "Executing batched top-N query"
        );
        tracing::trace!(sql = %sql, params = params.len(), "Top-N SQL");

        let rows = match conn.query(cx, &sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(parent_key) = row.get_by_name(PARENT_PK_COLUMN).cloned() else {
                return Outcome::Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: Some(sql),
                    sqlstate: None,
                    message: format!("result row is missing the {PARENT_PK_COLUMN} column"),
                    source: None,
                }));
            };
            match C::from_row(row) {
                Ok(record) => records.push(Batched { parent_key, record }),
                Err(e) => return Outcome::Err(e),
            }
        }

        tracing::debug!(row_count = records.len(), "Top-N query returned");
        Outcome::Ok(records)
    }

    fn render(&self, dialect: Dialect, keys: &[Value]) -> (String, Vec<Value>) {
        if keys.is_empty() {
            return (format!("SELECT * FROM {} WHERE 1 = 0", C::TABLE_NAME), Vec::new());
        }
        let mut params = Vec::new();
        let sql = match self.strategy.resolve(dialect) {
            TopNStrategy::Lateral => self.render_lateral(dialect, keys, &mut params),
            TopNStrategy::Auto | TopNStrategy::WindowFunction => {
                self.render_window(dialect, keys, &mut params)
            }
        };
        (sql, params)
    }

    fn render_lateral(&self, dialect: Dialect, keys: &[Value], params: &mut Vec<Value>) -> String {
        let child = C::TABLE_NAME;
        let parent_key = qualified(dialect, KEYS_ALIAS, PARENT_KEY_ALIAS);
        let ordering: Vec<OrderBy> = self
            .effective_ordering()
            .iter()
            .map(|o| o.qualify(child))
            .collect();

        let mut sql = format!(
            "SELECT {}, {} AS {} FROM (",
            self.projection(dialect),
            parent_key,
            dialect.quote_identifier(PARENT_PK_COLUMN)
        );
        sql.push_str(&self.derived_keys(dialect, keys, params));
        sql.push_str(&format!(
            ") AS {} CROSS JOIN LATERAL (SELECT * FROM {} WHERE {} = {}",
            dialect.quote_identifier(KEYS_ALIAS),
            child,
            qualified(dialect, child, self.foreign_key),
            parent_key
        ));
        self.push_filter(&mut sql, dialect, params);
        if !ordering.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&build_order_list(&ordering, dialect, params, 0));
        }
        if let Some(limit) = self.effective_limit() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.query.offset_value() {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql.push_str(&format!(") AS {child}"));
        self.push_joins(&mut sql);

        sql.push_str(" ORDER BY ");
        sql.push_str(&parent_key);
        if !ordering.is_empty() {
            sql.push_str(", ");
            sql.push_str(&build_order_list(&ordering, dialect, params, 0));
        }
        sql
    }

    fn render_window(&self, dialect: Dialect, keys: &[Value], params: &mut Vec<Value>) -> String {
        let child = C::TABLE_NAME;
        let fk = qualified(dialect, child, self.foreign_key);
        let row_number = qualified(dialect, child, ROW_NUMBER_ALIAS);
        let ordering: Vec<OrderBy> = self
            .effective_ordering()
            .iter()
            .map(|o| o.qualify(child))
            .collect();

        let mut sql = format!(
            "SELECT {}, {} AS {} FROM (SELECT {}.*, ROW_NUMBER() OVER (PARTITION BY {}",
            self.projection(dialect),
            fk,
            dialect.quote_identifier(PARENT_PK_COLUMN),
            child,
            fk
        );
        if !ordering.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&build_order_list(&ordering, dialect, params, 0));
        }
        sql.push_str(&format!(
            ") AS {} FROM {} WHERE {} IN (",
            dialect.quote_identifier(ROW_NUMBER_ALIAS),
            child,
            fk
        ));
        sql.push_str(&self.derived_keys(dialect, keys, params));
        sql.push(')');
        self.push_filter(&mut sql, dialect, params);
        sql.push_str(&format!(") AS {child}"));
        self.push_joins(&mut sql);

        let offset = self.query.offset_value().unwrap_or(0);
        let mut bounds = Vec::new();
        if offset > 0 {
            bounds.push(format!("{row_number} > {offset}"));
        }
        if let Some(limit) = self.effective_limit() {
            bounds.push(format!("{row_number} <= {}", offset.saturating_add(limit)));
        }
        if !bounds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&bounds.join(" AND "));
        }

        sql.push_str(&format!(" ORDER BY {fk}, {row_number}"));
        sql
    }

    /// `SELECT parent.pk AS "__parent_key" FROM parent WHERE parent.pk IN (...)`
    fn derived_keys(&self, dialect: Dialect, keys: &[Value], params: &mut Vec<Value>) -> String {
        let key_column = Expr::qualified(P::TABLE_NAME, self.parent_key_column);
        let restriction = key_column
            .clone()
            .in_list(keys.to_vec())
            .build_with_dialect(dialect, params, 0);
        format!(
            "SELECT {} AS {} FROM {} WHERE {}",
            key_column.build_with_dialect(dialect, params, 0),
            dialect.quote_identifier(PARENT_KEY_ALIAS),
            P::TABLE_NAME,
            restriction
        )
    }

    fn push_filter(&self, sql: &mut String, dialect: Dialect, params: &mut Vec<Value>) {
        if let Some(filter) = self.query.where_clause() {
            let expr = filter.expr().qualify(C::TABLE_NAME);
            sql.push_str(" AND (");
            sql.push_str(&expr.build_with_dialect(dialect, params, 0));
            sql.push(')');
        }
    }

    fn push_joins(&self, sql: &mut String) {
        for join in &self.joins {
            sql.push_str(&join.join_clause());
        }
    }

    fn projection(&self, dialect: Dialect) -> String {
        let child = C::TABLE_NAME;
        let mut parts: Vec<String> = if self.query.selected_columns().is_empty() {
            vec![format!("{child}.*")]
        } else {
            self.query
                .selected_columns()
                .iter()
                .map(|c| qualified(dialect, child, c))
                .collect()
        };
        for join in &self.joins {
            parts.extend(join.column_parts());
        }
        parts.join(", ")
    }
}

fn resolve_joins<C: Model>(query: &Select<C>) -> Result<Vec<EagerJoin>> {
    match query.eager_loader() {
        Some(loader) => loader.resolve(),
        None => Ok(Vec::new()),
    }
}

fn qualified(dialect: Dialect, table: &str, column: &str) -> String {
    format!(
        "{}.{}",
        dialect.quote_identifier(table),
        dialect.quote_identifier(column)
    )
}

/// Non-null keys with duplicates removed, in first-seen order.
fn distinct_keys(keys: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    keys.iter()
        .filter(|k| !k.is_null() && seen.insert(k.key()))
        .cloned()
        .collect()
}
