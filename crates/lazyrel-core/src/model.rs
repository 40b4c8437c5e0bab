//! Records the loader can fetch and key.

use crate::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;

/// A record type backed by one table.
///
/// Parents and children of a batched relationship are both `Model`s: parents
/// supply their key values, children are decoded from result rows.
///
/// # Example
///
/// ```ignore
/// impl Model for Post {
///     const TABLE_NAME: &'static str = "posts";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///     const RELATIONSHIPS: &'static [RelationshipInfo] = &[
///         RelationshipInfo::new("author", "users", RelationshipKind::ManyToOne)
///             .local_key("author_id"),
///     ];
///     // ...
/// }
/// ```
pub trait Model: Sized + Send + Sync {
    /// Table name, used unquoted in generated SQL.
    const TABLE_NAME: &'static str;

    const PRIMARY_KEY: &'static [&'static str];

    /// Relationships declared on this model.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Column metadata, in declaration order.
    fn fields() -> &'static [FieldInfo];

    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Decode a record, hydrating `Related<T>` fields from aliased columns.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Primary key values, in `PRIMARY_KEY` order.
    fn primary_key_value(&self) -> Vec<Value>;

    /// The value `to_row` reports for `column`.
    fn column_value(&self, column: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find_map(|(name, value)| (name == column).then_some(value))
    }
}

/// Look up a relationship declared on `M` by name.
pub fn find_relationship<M: Model>(name: &str) -> Option<&'static RelationshipInfo> {
    M::RELATIONSHIPS.iter().find(|r| r.name == name)
}
