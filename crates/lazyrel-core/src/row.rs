//! Result rows.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column names of a result set, shared by every row in it.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, by_name }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `name`, if the result set has that column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One row handed back by a `Connection`.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns: Arc::new(ColumnInfo::new(column_names)),
        }
    }

    /// Build a row over column names already shared with other rows.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.index_of(name)?;
        self.values.get(index)
    }

    /// Decode column `name` as `T`.
    ///
    /// A missing column and a failed conversion are both `Error::Type`
    /// naming the column.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column '{name}' in row"),
                column: Some(name.to_string()),
                rust_type: None,
            }));
        };
        match T::from_value(value) {
            Err(Error::Type(mut te)) => {
                te.column.get_or_insert_with(|| name.to_string());
                Err(Error::Type(te))
            }
            other => other,
        }
    }

    /// Extract the columns aliased `<prefix>__<column>` into a new row keyed
    /// by the bare column name.
    ///
    /// Returns `None` when the row carries no column with that prefix, or when
    /// every prefixed value is NULL (the LEFT JOIN found no match).
    pub fn subset_by_prefix(&self, prefix: &str) -> Option<Row> {
        let marker = format!("{prefix}__");
        let mut names = Vec::new();
        let mut values = Vec::new();
        for (name, value) in self.iter() {
            if let Some(bare) = name.strip_prefix(&marker) {
                names.push(bare.to_string());
                values.push(value.clone());
            }
        }
        if names.is_empty() || values.iter().all(Value::is_null) {
            return None;
        }
        Some(Row::new(names, values))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Typed extraction from a column value.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! from_value_via_try_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    <$ty>::try_from(value.clone())
                }
            }
        )*
    };
}

from_value_via_try_from!(bool, i32, i64, f64, String);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}
