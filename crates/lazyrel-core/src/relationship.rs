//! Relationship metadata.
//!
//! Relationships are declared as static metadata on each `Model`. Higher
//! layers (the eager loader and the batched top-N loader) read it to build
//! SQL without runtime reflection.

use crate::Model;
use crate::field::FieldInfo;
use std::fmt;
use std::sync::OnceLock;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one: `User` has one `Profile`.
    OneToOne,
    /// Many-to-one: many `Post`s belong to one `User`.
    #[default]
    ManyToOne,
    /// One-to-many: one `User` has many `Post`s.
    OneToMany,
    /// Many-to-many: `Post`s have many `Tag`s via a link table.
    ManyToMany,
}

impl RelationshipKind {
    /// Whether the owning side expects a collection.
    pub const fn is_collection(self) -> bool {
        matches!(self, RelationshipKind::OneToMany | RelationshipKind::ManyToMany)
    }
}

/// Information about a link/join table for many-to-many relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableInfo {
    /// The link table name (e.g., `"post_tags"`).
    pub table_name: &'static str,
    /// Column in link table pointing to the local model.
    pub local_column: &'static str,
    /// Column in link table pointing to the remote model.
    pub remote_column: &'static str,
}

impl LinkTableInfo {
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            local_column,
            remote_column,
        }
    }
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relationship field.
    pub name: &'static str,

    /// The related model's table name.
    pub related_table: &'static str,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Column on the owning model. For ManyToOne this is the foreign key
    /// (`"author_id"` on `Post`); for OneToMany it overrides the parent key
    /// the child's foreign key points at (default: the single primary key).
    pub local_key: Option<&'static str>,

    /// Foreign key column on the related model (OneToMany / OneToOne).
    pub remote_key: Option<&'static str>,

    /// Composite remote foreign key columns.
    ///
    /// If set, this takes precedence over `remote_key`.
    pub remote_keys: Option<&'static [&'static str]>,

    /// Link table for ManyToMany relationships.
    pub link_table: Option<LinkTableInfo>,

    /// Default ordering for related items (e.g., "created_at DESC").
    pub order_by: Option<&'static str>,

    /// Force list or single (override kind inference).
    pub uselist: Option<bool>,

    /// Function pointer returning the related model's fields metadata.
    pub related_fields_fn: fn() -> &'static [FieldInfo],

    /// Function pointer returning the related model's own relationships,
    /// used to resolve nested eager-loading paths.
    pub related_relationships_fn: fn() -> &'static [RelationshipInfo],
}

impl PartialEq for RelationshipInfo {
    fn eq(&self, other: &Self) -> bool {
        // Function pointers are not part of a relationship's identity.
        self.name == other.name
            && self.related_table == other.related_table
            && self.kind == other.kind
            && self.local_key == other.local_key
            && self.remote_key_cols() == other.remote_key_cols()
            && self.link_table == other.link_table
            && self.order_by == other.order_by
            && self.uselist == other.uselist
    }
}

impl Eq for RelationshipInfo {}

impl RelationshipInfo {
    fn empty_related_fields() -> &'static [FieldInfo] {
        &[]
    }

    fn empty_related_relationships() -> &'static [RelationshipInfo] {
        &[]
    }

    /// Create a new relationship with required fields.
    #[must_use]
    pub const fn new(
        name: &'static str,
        related_table: &'static str,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            name,
            related_table,
            kind,
            local_key: None,
            remote_key: None,
            remote_keys: None,
            link_table: None,
            order_by: None,
            uselist: None,
            related_fields_fn: Self::empty_related_fields,
            related_relationships_fn: Self::empty_related_relationships,
        }
    }

    /// Describe the relationship from `M`'s point of view, wiring the related
    /// model's fields and relationships.
    #[must_use]
    pub const fn to_model<M: Model>(name: &'static str, kind: RelationshipKind) -> Self {
        Self::new(name, M::TABLE_NAME, kind)
            .with_related_fields(M::fields)
            .with_related_relationships(related_relationships_of::<M>)
    }

    /// Return the remote key columns (empty slice if unset).
    #[must_use]
    pub fn remote_key_cols(&self) -> &[&'static str] {
        if let Some(keys) = self.remote_keys {
            return keys;
        }
        match &self.remote_key {
            Some(key) => std::slice::from_ref(key),
            None => &[],
        }
    }

    /// Whether the owning side expects a collection.
    #[must_use]
    pub fn uses_list(&self) -> bool {
        self.uselist.unwrap_or(self.kind.is_collection())
    }

    /// The related model's fields.
    #[must_use]
    pub fn related_fields(&self) -> &'static [FieldInfo] {
        (self.related_fields_fn)()
    }

    /// The related model's relationships.
    #[must_use]
    pub fn related_relationships(&self) -> &'static [RelationshipInfo] {
        (self.related_relationships_fn)()
    }

    /// Provide the related model's `Model::fields()` function pointer.
    #[must_use]
    pub const fn with_related_fields(mut self, f: fn() -> &'static [FieldInfo]) -> Self {
        self.related_fields_fn = f;
        self
    }

    /// Set the local key column.
    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Set the remote foreign key column.
    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self.remote_keys = None;
        self
    }

    /// Set composite remote foreign key columns.
    #[must_use]
    pub const fn remote_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.remote_keys = Some(keys);
        self.remote_key = None;
        self
    }

    /// Set the link table (ManyToMany).
    #[must_use]
    pub const fn link_table(mut self, info: LinkTableInfo) -> Self {
        self.link_table = Some(info);
        self
    }

    /// Set default ordering.
    #[must_use]
    pub const fn order_by(mut self, ordering: &'static str) -> Self {
        self.order_by = Some(ordering);
        self
    }

    /// Force list or single.
    #[must_use]
    pub const fn uselist(mut self, value: bool) -> Self {
        self.uselist = Some(value);
        self
    }

    /// Provide the related model's relationships function pointer.
    #[must_use]
    pub const fn with_related_relationships(mut self, f: fn() -> &'static [RelationshipInfo]) -> Self {
        self.related_relationships_fn = f;
        self
    }
}

fn related_relationships_of<M: Model>() -> &'static [RelationshipInfo] {
    M::RELATIONSHIPS
}

/// A related single object populated by eager loading.
///
/// States:
/// - **Unloaded**: nothing fetched yet
/// - **Loaded**: fetched and cached (possibly as "no related row")
pub struct Related<T: Model> {
    loaded: OnceLock<Option<T>>,
}

impl<T: Model> Related<T> {
    /// Create an unloaded relationship.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            loaded: OnceLock::new(),
        }
    }

    /// Create with an already-loaded value.
    #[must_use]
    pub fn loaded(obj: Option<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(obj);
        Self { loaded: cell }
    }

    /// Get the loaded object (None if not loaded or loaded as null).
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.loaded.get().and_then(|o| o.as_ref())
    }

    /// Check if the relationship has been loaded (including loaded-null).
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Set the loaded object. Fails if already set.
    pub fn set_loaded(&self, obj: Option<T>) -> Result<(), Option<T>> {
        self.loaded.set(obj)
    }
}

impl<T: Model> Default for Related<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Model + Clone> Clone for Related<T> {
    fn clone(&self) -> Self {
        let cloned = Self::empty();
        if let Some(value) = self.loaded.get() {
            let _ = cloned.loaded.set(value.clone());
        }
        cloned
    }
}

impl<T: Model + PartialEq> PartialEq for Related<T> {
    fn eq(&self, other: &Self) -> bool {
        self.loaded.get() == other.loaded.get()
    }
}

impl<T: Model + fmt::Debug> fmt::Debug for Related<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_loaded() { "loaded" } else { "unloaded" };
        f.debug_struct("Related")
            .field("state", &state)
            .field("loaded", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Result, Row, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: i64,
    }

    impl Model for Tag {
        const TABLE_NAME: &'static str = "tags";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            const FIELDS: &[FieldInfo] = &[FieldInfo::new("id").primary_key(true)];
            FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", Value::BigInt(self.id))]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
            })
        }

        fn primary_key_value(&self) -> Vec<Value> {
            vec![Value::BigInt(self.id)]
        }
    }

    #[test]
    fn test_relationship_kind_default() {
        assert_eq!(RelationshipKind::default(), RelationshipKind::ManyToOne);
        assert!(RelationshipKind::OneToMany.is_collection());
        assert!(!RelationshipKind::OneToOne.is_collection());
    }

    #[test]
    fn test_relationship_info_builder_chain() {
        const REL: RelationshipInfo =
            RelationshipInfo::new("comments", "comments", RelationshipKind::OneToMany)
                .remote_key("post_id")
                .order_by("created_at DESC");
        assert_eq!(REL.remote_key_cols(), &["post_id"]);
        assert_eq!(REL.order_by, Some("created_at DESC"));
        assert!(REL.uses_list());
        assert!(REL.related_fields().is_empty());

        let single = REL.uselist(false);
        assert!(!single.uses_list());
    }

    #[test]
    fn test_composite_remote_keys_replace_single() {
        let rel = RelationshipInfo::new("x", "x", RelationshipKind::OneToMany)
            .remote_key("a")
            .remote_keys(&["a", "b"]);
        assert_eq!(rel.remote_key_cols(), &["a", "b"]);
    }

    #[test]
    fn test_to_model_wires_metadata() {
        let rel = RelationshipInfo::to_model::<Tag>("tags", RelationshipKind::ManyToMany)
            .link_table(LinkTableInfo::new("post_tags", "post_id", "tag_id"));
        assert_eq!(rel.related_table, "tags");
        assert_eq!(rel.related_fields().len(), 1);
        assert_eq!(rel.link_table.map(|l| l.table_name), Some("post_tags"));
    }

    #[test]
    fn test_equality_ignores_function_pointers() {
        let a = RelationshipInfo::new("tags", "tags", RelationshipKind::OneToMany);
        let b = RelationshipInfo::to_model::<Tag>("tags", RelationshipKind::OneToMany);
        assert_eq!(a, b);
    }

    #[test]
    fn test_related_set_loaded_once() {
        let related = Related::<Tag>::empty();
        assert!(!related.is_loaded());
        assert!(related.set_loaded(Some(Tag { id: 1 })).is_ok());
        assert!(related.set_loaded(None).is_err());
        assert_eq!(related.get().map(|t| t.id), Some(1));

        let cloned = related.clone();
        assert_eq!(cloned, related);
    }
}
