//! Row Mapping Module
//!
//! [`RowMapping`] is the unit returned by every query: an immutable, ordered
//! mapping from column name to value. Two lookups are offered with different
//! failure kinds, [`RowMapping::item`] for subscript-style access and
//! [`RowMapping::attr`] for attribute-style access.

use crate::core::{DbError, Result};
use rusqlite::types::{FromSql, Value, ValueRef};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::ops::Index;
use std::sync::Arc;

/// Column names of a result set after duplicate names have been collapsed.
///
/// A repeated name keeps the position of its first occurrence and takes the
/// value of its last one.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    names: Arc<[String]>,
    sources: Vec<usize>,
}

impl RowShape {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut sources: Vec<usize> = Vec::new();
        for (index, name) in columns.into_iter().enumerate() {
            let name = name.into();
            match names.iter().position(|n| *n == name) {
                Some(existing) => sources[existing] = index,
                None => {
                    names.push(name);
                    sources.push(index);
                }
            }
        }
        RowShape {
            names: names.into(),
            sources,
        }
    }

    /// Builds a row from the raw values of one result row. Missing trailing
    /// values shorten the row.
    pub fn row(&self, mut values: Vec<Value>) -> RowMapping {
        let available = self
            .sources
            .iter()
            .take_while(|&&source| source < values.len())
            .count();
        let picked = self.sources[..available]
            .iter()
            .map(|&source| std::mem::replace(&mut values[source], Value::Null))
            .collect();
        RowMapping {
            names: Arc::clone(&self.names),
            len: available,
            values: picked,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// An ordered column-name to value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMapping {
    names: Arc<[String]>,
    len: usize,
    values: Vec<Value>,
}

impl RowMapping {
    /// Pairs `names` with `values`; extra entries on either side are dropped.
    pub fn new<N, S, V>(names: N, values: V) -> Self
    where
        N: IntoIterator<Item = S>,
        S: Into<String>,
        V: IntoIterator<Item = Value>,
    {
        RowShape::new(names).row(values.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Column names in cursor order.
    pub fn columns(&self) -> &[String] {
        &self.names[..self.len]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Optional probe; never fails.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.values[i])
    }

    /// Subscript access: a missing column is [`DbError::KeyNotFound`].
    pub fn item(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| DbError::KeyNotFound(name.to_string()))
    }

    /// Attribute access: a missing column is [`DbError::NoSuchAttribute`].
    pub fn attr(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| DbError::NoSuchAttribute(name.to_string()))
    }

    /// Attribute access converted to `T`.
    pub fn get_as<T: FromSql>(&self, name: &str) -> Result<T> {
        let value = self.attr(name)?;
        T::column_result(ValueRef::from(value)).map_err(|source| DbError::Conversion {
            column: name.to_string(),
            source,
        })
    }

    /// Consumes the row and returns its values in column order.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|n| n == name)
    }
}

impl Index<&str> for RowMapping {
    type Output = Value;

    /// # Panics
    ///
    /// Panics if the column is not present. Use [`RowMapping::item`] to get an error instead.
    fn index(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("Key not found: '{}'", name),
        }
    }
}

impl<'a> IntoIterator for &'a RowMapping {
    type Item = (&'a str, &'a Value);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

struct SerializeValue<'a>(&'a Value);

impl Serialize for SerializeValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.collect_seq(b.iter()),
        }
    }
}

impl Serialize for RowMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &SerializeValue(value))?;
        }
        map.end()
    }
}
