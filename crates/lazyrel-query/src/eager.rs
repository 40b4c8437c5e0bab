//! Eager loading hints for relationships.
//!
//! An `EagerLoader` records which relationships of the queried model should
//! come back pre-fetched. The hints are resolved against static relationship
//! metadata and rendered as `LEFT JOIN`s with `<table>__<column>` aliases so
//! `Model::from_row` can hydrate `Related<T>` fields from the same row.

use lazyrel_core::{Error, Model, RelationError, RelationshipInfo, RelationshipKind, Result};
use std::marker::PhantomData;

/// Builder for eager loading configuration.
///
/// # Example
///
/// ```ignore
/// let recent = Select::<Post>::new()
///     .eager(EagerLoader::new().include("author"))
///     .order_by(Expr::col("created_at").desc());
/// ```
#[derive(Debug)]
pub struct EagerLoader<T: Model> {
    /// Relationships to eager-load.
    includes: Vec<IncludePath>,
    /// Model type marker.
    _marker: PhantomData<T>,
}

impl<T: Model> Clone for EagerLoader<T> {
    fn clone(&self) -> Self {
        Self {
            includes: self.includes.clone(),
            _marker: PhantomData,
        }
    }
}

/// A path to a relationship to include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludePath {
    /// Relationship name on parent.
    pub relationship: &'static str,
    /// Nested relationships to load.
    pub nested: Vec<IncludePath>,
}

impl IncludePath {
    /// Create a new include path for a single relationship.
    #[must_use]
    pub fn new(relationship: &'static str) -> Self {
        Self {
            relationship,
            nested: Vec::new(),
        }
    }

    /// Add a nested relationship to load.
    #[must_use]
    pub fn nest(mut self, path: IncludePath) -> Self {
        self.nested.push(path);
        self
    }

    fn from_parts(parts: &[&'static str]) -> Option<Self> {
        let (first, rest) = parts.split_first()?;
        let mut path = IncludePath::new(first);
        if let Some(child) = Self::from_parts(rest) {
            path.nested.push(child);
        }
        Some(path)
    }
}

impl<T: Model> EagerLoader<T> {
    /// Create a new empty eager loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            includes: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Include a relationship in eager loading.
    #[must_use]
    pub fn include(mut self, relationship: &'static str) -> Self {
        self.includes.push(IncludePath::new(relationship));
        self
    }

    /// Include a nested relationship (e.g., "author.team").
    ///
    /// Empty segments are ignored, so `"author..team"` equals `"author.team"`.
    #[must_use]
    pub fn include_nested(mut self, path: &'static str) -> Self {
        let parts: Vec<&'static str> = path
            .trim()
            .split('.')
            .filter(|p| !p.is_empty())
            .collect();
        if let Some(include) = IncludePath::from_parts(&parts) {
            self.includes.push(include);
        }
        self
    }

    /// Merge another loader's hints into this one.
    #[must_use]
    pub fn merge(mut self, other: EagerLoader<T>) -> Self {
        for include in other.includes {
            if !self.includes.contains(&include) {
                self.includes.push(include);
            }
        }
        self
    }

    /// Get the include paths.
    #[must_use]
    pub fn includes(&self) -> &[IncludePath] {
        &self.includes
    }

    /// Check if any relationships are included.
    #[must_use]
    pub fn has_includes(&self) -> bool {
        !self.includes.is_empty()
    }

    /// Resolve every include path against relationship metadata.
    ///
    /// Joins are returned in the order they must appear in the statement
    /// (a parent before its nested includes). Only single-valued
    /// relationships can be joined without multiplying the queried rows.
    pub fn resolve(&self) -> Result<Vec<EagerJoin>> {
        let mut joins = Vec::new();
        for include in &self.includes {
            resolve_path(T::TABLE_NAME, T::RELATIONSHIPS, include, &mut joins)?;
        }
        Ok(joins)
    }
}

impl<T: Model> Default for EagerLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved eager join: which table it hangs off and the relationship it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EagerJoin {
    pub parent_table: &'static str,
    pub relationship: &'static RelationshipInfo,
}

impl EagerJoin {
    /// The `LEFT JOIN` clause for this include.
    pub fn join_clause(&self) -> String {
        build_join_clause(self.parent_table, self.relationship)
    }

    /// The aliased projection for the related table's columns.
    pub fn column_parts(&self) -> Vec<String> {
        let columns: Vec<&str> = self
            .relationship
            .related_fields()
            .iter()
            .map(|f| f.column_name)
            .collect();
        build_aliased_column_parts(self.relationship.related_table, &columns)
    }
}

fn resolve_path(
    parent_table: &'static str,
    relationships: &'static [RelationshipInfo],
    include: &IncludePath,
    out: &mut Vec<EagerJoin>,
) -> Result<()> {
    let Some(rel) = relationships
        .iter()
        .find(|r| r.name == include.relationship)
    else {
        return Err(Error::Relation(RelationError::unsupported(
            include.relationship,
            format!(
                "eager-loading hint '{}' does not name a relationship of '{}'",
                include.relationship, parent_table
            ),
        )));
    };

    if rel.uses_list() {
        return Err(Error::Relation(RelationError::unsupported(
            rel.name,
            format!(
                "eager-loading hint '{}' is a collection; only single-valued relationships \
                 can be joined into a per-parent top-N statement",
                rel.name
            ),
        )));
    }

    let join = EagerJoin {
        parent_table,
        relationship: rel,
    };
    if !out.contains(&join) {
        out.push(join);
    }

    for nested in &include.nested {
        resolve_path(rel.related_table, rel.related_relationships(), nested, out)?;
    }
    Ok(())
}

/// `LEFT JOIN` for a single-valued relationship hanging off `parent_table`.
///
/// A one-to-one relationship declared only by a remote key is owned by the
/// related row; every other shape references the related row from the parent.
#[must_use]
pub fn build_join_clause(parent_table: &str, rel: &RelationshipInfo) -> String {
    let target = rel.related_table;
    let on = match (rel.kind, rel.local_key, rel.remote_key) {
        (RelationshipKind::OneToOne, None, Some(fk)) => {
            format!("{target}.{fk} = {parent_table}.id")
        }
        (_, local, remote) => format!(
            "{parent_table}.{} = {target}.{}",
            local.unwrap_or("id"),
            remote.unwrap_or("id")
        ),
    };
    format!(" LEFT JOIN {target} ON {on}")
}

/// `<table>.<col> AS <table>__<col>` for every column.
#[must_use]
pub fn build_aliased_column_parts(table_name: &str, columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .map(|col| format!("{table_name}.{col} AS {table_name}__{col}"))
        .collect()
}
