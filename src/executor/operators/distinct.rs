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

//! Distinct Operator.
//!
//! Removes tuples whose projected key equals the key of the tuple before
//! them in the sorted stream. The predecessor is carried from one sorted
//! page to the next, so the result does not depend on how the input is cut
//! into batches.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::{Attribute, Batch, Error, KeyIndices, Result, Schema, Tuple};
use crate::executor::operator::Operator;
use crate::executor::sort::ExternalSort;
use crate::storage::ExecConfig;

/// Duplicate elimination over a projected attribute list.
pub struct Distinct {
    // Input sorted on the projected attributes
    sorted: ExternalSort,
    keys: KeyIndices,

    // State
    page: VecDeque<Tuple>,
    previous: Option<Tuple>,
    sorted_done: bool,
    opened: bool,
    finished: bool,
}

impl Distinct {
    /// Create a distinct over `attributes` of `input`, sorting with
    /// `num_buffers` pages.
    pub fn new(
        input: Box<dyn Operator>,
        attributes: &[Attribute],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        let sorted = ExternalSort::new(input, attributes, num_buffers, config)?;
        let keys = sorted.keys().iter().copied().collect();
        Ok(Self {
            sorted,
            keys,
            page: VecDeque::new(),
            previous: None,
            sorted_done: false,
            opened: false,
            finished: false,
        })
    }

    fn next_sorted(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.page.pop_front() {
                return Ok(Some(tuple));
            }
            if self.sorted_done {
                return Ok(None);
            }
            match self.sorted.next()? {
                Some(batch) => self.page = batch.into_tuples().into(),
                None => self.sorted_done = true,
            }
        }
    }
}

impl Operator for Distinct {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.sorted.open()?;
        self.page.clear();
        self.previous = None;
        self.sorted_done = false;
        self.finished = false;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.opened {
            return Err(Error::NotOpen("Distinct"));
        }
        if self.finished {
            return Ok(None);
        }
        let mut out = Batch::new(self.sorted.batch_capacity());
        while !out.is_full() {
            let tuple = match self.next_sorted()? {
                Some(tuple) => tuple,
                None => {
                    self.finished = true;
                    break;
                }
            };
            if let Some(prev) = &self.previous {
                if prev.compare_keys(&tuple, &self.keys).is_eq() {
                    continue;
                }
            }
            self.previous = Some(tuple.clone());
            out.push(tuple)
                .map_err(|_| Error::internal("distinct output page overflow"))?;
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.finished = true;
        self.page.clear();
        self.previous = None;
        debug!(operator = "Distinct", "closed");
        self.sorted.close()
    }

    fn schema(&self) -> &Schema {
        self.sorted.schema()
    }

    fn name(&self) -> &str {
        "Distinct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, SchemaBuilder, Value};
    use crate::executor::operator::{collect_tuples, MaterializedOperator};

    fn schema() -> Schema {
        SchemaBuilder::new("t")
            .add("a", DataType::Integer)
            .add("b", DataType::Integer)
            .build()
    }

    fn tuples(data: &[(i64, i64)]) -> Vec<Tuple> {
        data.iter()
            .map(|&(a, b)| Tuple::from_values(vec![Value::integer(a), Value::integer(b)]))
            .collect()
    }

    fn both() -> Vec<Attribute> {
        vec![
            Attribute::new("t", "a", DataType::Integer),
            Attribute::new("t", "b", DataType::Integer),
        ]
    }

    fn run(
        input: MaterializedOperator,
        attrs: &[Attribute],
        dir: &std::path::Path,
    ) -> Vec<(i64, i64)> {
        let config = ExecConfig::default().with_page_size(16).with_spill_dir(dir);
        let mut distinct = Distinct::new(Box::new(input), attrs, 3, &config).unwrap();
        collect_tuples(&mut distinct)
            .unwrap()
            .iter()
            .map(|t| (t[0].as_int64().unwrap(), t[1].as_int64().unwrap()))
            .collect()
    }

    #[test]
    fn test_adjacent_duplicates_removed() {
        let dir = tempfile::tempdir().unwrap();
        let data = [(1, 2), (1, 2), (1, 3), (2, 1)];
        let input = MaterializedOperator::new(tuples(&data), schema(), 16);
        assert_eq!(run(input, &both(), dir.path()), vec![(1, 2), (1, 3), (2, 1)]);
    }

    #[test]
    fn test_single_tuple_batches_give_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let data = [(2, 1), (1, 2), (1, 3), (1, 2), (2, 1), (1, 2)];
        let paged = MaterializedOperator::new(tuples(&data), schema(), 16);
        let single = MaterializedOperator::with_batch_capacity(tuples(&data), schema(), 1);
        let expected = vec![(1, 2), (1, 3), (2, 1)];
        assert_eq!(run(paged, &both(), dir.path()), expected);
        assert_eq!(run(single, &both(), dir.path()), expected);
    }

    #[test]
    fn test_duplicates_across_sorted_pages() {
        let dir = tempfile::tempdir().unwrap();
        // Sorted pages hold two tuples; the run of 7s crosses three of them
        let data = [(7, 0), (7, 0), (7, 0), (7, 0), (7, 0), (3, 0)];
        let input = MaterializedOperator::new(tuples(&data), schema(), 16);
        assert_eq!(run(input, &both(), dir.path()), vec![(3, 0), (7, 0)]);
    }

    #[test]
    fn test_distinct_on_key_subset() {
        let dir = tempfile::tempdir().unwrap();
        let data = [(1, 9), (2, 8), (1, 7)];
        let input = MaterializedOperator::new(tuples(&data), schema(), 16);
        let first = vec![Attribute::new("t", "a", DataType::Integer)];
        // First tuple of each key group in input order survives
        assert_eq!(run(input, &first, dir.path()), vec![(1, 9), (2, 8)]);
    }
}
