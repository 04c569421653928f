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

//! Tuple - an immutable ordered sequence of field values

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use super::value::Value;

/// An immutable ordered sequence of field values
///
/// Fields are shared behind an `Arc`, so the copies made by sort runs,
/// join blocks and partitions only bump a reference count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    values: Arc<[Value]>,
}

impl Tuple {
    /// Create a tuple from a vector of values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: Arc::from(values),
        }
    }

    /// Create the concatenation of a left and a right tuple
    pub fn join_with(&self, right: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.len() + right.len());
        values.extend(self.values.iter().cloned());
        values.extend(right.values.iter().cloned());
        Tuple::from_values(values)
    }

    /// Create a tuple holding only the given columns, in the given order
    pub fn project(&self, indices: &[usize]) -> Tuple {
        Tuple::from_values(
            indices
                .iter()
                .filter_map(|&i| self.values.get(i).cloned())
                .collect(),
        )
    }

    /// Number of fields
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no fields
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a field by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate over the fields
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Fields as a slice
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Lexicographic comparison of `self` under `keys` against `other` under
    /// `other_keys`; the first differing key decides.
    ///
    /// Both key lists must have the same length. Keys past the end of a tuple
    /// compare as missing, which orders before any value.
    pub fn compare_on(&self, keys: &[usize], other: &Tuple, other_keys: &[usize]) -> Ordering {
        debug_assert_eq!(keys.len(), other_keys.len());
        for (&a, &b) in keys.iter().zip(other_keys) {
            let ord = match (self.get(a), other.get(b)) {
                (Some(x), Some(y)) => x.cmp(y),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two tuples of the same schema under one key list
    #[inline]
    pub fn compare_keys(&self, other: &Tuple, keys: &[usize]) -> Ordering {
        self.compare_on(keys, other, keys)
    }
}

impl Index<usize> for Tuple {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::from_values(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Tuple::from_values(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(vals: &[i64]) -> Tuple {
        vals.iter().map(|&v| Value::integer(v)).collect()
    }

    #[test]
    fn test_join_and_project() {
        let joined = ints(&[1, 2]).join_with(&ints(&[3]));
        assert_eq!(joined, ints(&[1, 2, 3]));
        assert_eq!(joined.project(&[2, 0]), ints(&[3, 1]));
        assert_eq!(joined.to_string(), "(1, 2, 3)");
    }

    #[test]
    fn test_first_differing_key_decides() {
        let a = ints(&[1, 9, 5]);
        let b = ints(&[1, 2, 7]);
        assert_eq!(a.compare_keys(&b, &[0, 1]), Ordering::Greater);
        assert_eq!(a.compare_keys(&b, &[0, 2]), Ordering::Less);
        assert_eq!(a.compare_keys(&b, &[0]), Ordering::Equal);
    }

    #[test]
    fn test_compare_across_sides() {
        let left = ints(&[10, 4]);
        let right = ints(&[4, 99]);
        assert_eq!(left.compare_on(&[1], &right, &[0]), Ordering::Equal);
        assert_eq!(left.compare_on(&[0], &right, &[0]), Ordering::Greater);
    }
}
