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

//! Batch - the fixed-capacity page of tuples exchanged between operators
//!
//! A batch is the unit of buffer accounting: an operator allotted `B` pages
//! may hold at most `B` batches worth of tuples in memory at once.

use super::tuple::Tuple;

/// Fixed-capacity ordered sequence of tuples
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    capacity: usize,
    tuples: Vec<Tuple>,
}

impl Batch {
    /// Number of tuples of `tuple_size` bytes that fit in a page.
    ///
    /// Always at least one, so a tuple wider than a page still travels alone.
    pub fn capacity_for(page_size: usize, tuple_size: usize) -> usize {
        if tuple_size == 0 {
            return page_size.max(1);
        }
        (page_size / tuple_size).max(1)
    }

    /// Create an empty batch holding at most `capacity` tuples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            tuples: Vec::with_capacity(capacity),
        }
    }

    /// Create a batch from tuples; `tuples` must not exceed `capacity`
    pub fn from_tuples(capacity: usize, tuples: Vec<Tuple>) -> Self {
        let capacity = capacity.max(1);
        debug_assert!(tuples.len() <= capacity);
        Self { capacity, tuples }
    }

    /// Append a tuple.
    ///
    /// Returns the tuple back if the batch is already full.
    pub fn push(&mut self, tuple: Tuple) -> std::result::Result<(), Tuple> {
        if self.is_full() {
            return Err(tuple);
        }
        self.tuples.push(tuple);
        Ok(())
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    /// Get a tuple by position
    pub fn get(&self, index: usize) -> Option<&Tuple> {
        self.tuples.get(index)
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// Consume the batch, returning its tuples
    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }
}

impl IntoIterator for Batch {
    type Item = Tuple;
    type IntoIter = std::vec::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn tuple(v: i64) -> Tuple {
        Tuple::from_values(vec![Value::integer(v)])
    }

    #[test]
    fn test_capacity_for() {
        assert_eq!(Batch::capacity_for(4096, 8), 512);
        assert_eq!(Batch::capacity_for(100, 30), 3);
        assert_eq!(Batch::capacity_for(16, 64), 1);
        assert_eq!(Batch::capacity_for(16, 0), 16);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut batch = Batch::new(2);
        assert!(batch.is_empty());
        assert!(batch.push(tuple(1)).is_ok());
        assert!(!batch.is_full());
        assert!(batch.push(tuple(2)).is_ok());
        assert!(batch.is_full());
        assert_eq!(batch.push(tuple(3)), Err(tuple(3)));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1), Some(&tuple(2)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let batch = Batch::new(0);
        assert_eq!(batch.capacity(), 1);
    }
}
