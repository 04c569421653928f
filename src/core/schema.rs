// Copyright 2025 Spillway Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Schema types - attributes, join conditions and tuple layouts
//!
//! A [`Schema`] is the ordered attribute list of the tuples an operator
//! produces. Operators resolve every key [`Attribute`] to a field index
//! through it once, when they are built. Plan transforms never patch a
//! schema by hand; they recompute it from the children.

use std::fmt;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use super::error::{Error, Result};
use super::types::DataType;

/// Field positions of a key, resolved against one schema
pub type KeyIndices = SmallVec<[usize; 4]>;

/// A column of a base relation, identified by `(table, column)`
///
/// The data type is carried along for page accounting but does not take part
/// in equality.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Table (or alias) the column belongs to
    pub table: String,

    /// Column name
    pub column: String,

    /// Data type of the column
    pub data_type: DataType,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(table: impl Into<String>, column: impl Into<String>, data_type: DataType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            data_type,
        }
    }

    /// Width of the attribute inside a page
    pub fn width(&self) -> usize {
        self.data_type.width()
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column == other.column
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column.hash(state);
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// An equi-join predicate `left = right`
///
/// Inside a plan, `left` always resolves against the left child's schema and
/// `right` against the right child's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinCondition {
    pub left: Attribute,
    pub right: Attribute,
}

impl JoinCondition {
    pub fn new(left: Attribute, right: Attribute) -> Self {
        Self { left, right }
    }

    /// The same predicate with its sides exchanged
    pub fn flipped(&self) -> Self {
        Self {
            left: self.right.clone(),
            right: self.left.clone(),
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.left, self.right)
    }
}

/// Ordered attribute list of a tuple layout
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    /// Create a schema from attributes
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    /// Position of an attribute, if present
    pub fn index_of(&self, attr: &Attribute) -> Option<usize> {
        self.attributes.iter().position(|a| a == attr)
    }

    /// Returns true if the schema contains the attribute
    pub fn contains(&self, attr: &Attribute) -> bool {
        self.index_of(attr).is_some()
    }

    /// Position of an attribute, failing with `AttributeNotFound` on a miss
    pub fn position(&self, attr: &Attribute) -> Result<usize> {
        self.index_of(attr)
            .ok_or_else(|| Error::attribute_not_found(attr.to_string()))
    }

    /// Resolve a key attribute list to field positions
    pub fn positions<'a, I>(&self, attrs: I) -> Result<KeyIndices>
    where
        I: IntoIterator<Item = &'a Attribute>,
    {
        attrs.into_iter().map(|a| self.position(a)).collect()
    }

    /// Schema of `self` joined with `right`: left attributes, then right
    pub fn join_with(&self, right: &Schema) -> Schema {
        let mut attributes = Vec::with_capacity(self.len() + right.len());
        attributes.extend(self.attributes.iter().cloned());
        attributes.extend(right.attributes.iter().cloned());
        Schema { attributes }
    }

    /// Schema holding only `attrs`, in that order
    pub fn sub_schema(&self, attrs: &[Attribute]) -> Result<Schema> {
        let attributes = attrs
            .iter()
            .map(|a| {
                self.index_of(a)
                    .map(|i| self.attributes[i].clone())
                    .ok_or_else(|| Error::attribute_not_found(a.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema { attributes })
    }

    /// Bytes a tuple of this schema takes in a page
    pub fn tuple_size(&self) -> usize {
        self.attributes.iter().map(Attribute::width).sum()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", attr)?;
        }
        write!(f, "]")
    }
}

/// Builder for the schema of one base relation
pub struct SchemaBuilder {
    table: String,
    attributes: Vec<Attribute>,
}

impl SchemaBuilder {
    /// Start a schema for `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attributes: Vec::new(),
        }
    }

    /// Add a column
    pub fn add(mut self, column: impl Into<String>, data_type: DataType) -> Self {
        self.attributes
            .push(Attribute::new(self.table.clone(), column, data_type));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.attributes)
    }
}
