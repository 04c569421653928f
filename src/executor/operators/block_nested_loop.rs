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

//! Block Nested-Loop Join Operator.
//!
//! Joins two inputs on equi-join conditions without requiring any order:
//!
//! ```text
//! open():  right child ──drain──► spill file        left child opened
//! next():  for each block of up to (B - 2) left pages
//!              for each right page read back from the spill file
//!                  for each (left, right) pair: emit if keys match
//! ```
//!
//! The block, one right page and the output page together use the `B`
//! pages the join is given. Block size is counted in tuples of the left
//! schema's page capacity, not in child batches, so a child handing out
//! oversized batches cannot widen it. The page nested-loop variant uses a
//! block of a single left page.
//!
//! ## Resuming a paused scan
//!
//! `(left_cursor, right_cursor)` always names the next candidate pair in
//! the current block and right page. When the output page fills after
//! pair `(i, j)`:
//!
//! | Paused at                 | Resume at  |
//! |---------------------------|------------|
//! | `i = last, j = last`      | `(0, 0)`, next right page |
//! | `i ≠ last, j = last`      | `(i + 1, 0)` |
//! | `i = last, j ≠ last`      | `(i, j + 1)` |
//! | otherwise                 | `(i, j + 1)` |
//!
//! A new left block is loaded exactly when the cursor is `(0, 0)` and the
//! right scan for the current block has ended.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::{Batch, Error, JoinCondition, KeyIndices, Result, Schema, Tuple};
use crate::executor::operator::Operator;
use crate::storage::spill::{RunReader, SpillFile, SpillSpace};
use crate::storage::{ExecConfig, MIN_JOIN_BUFFERS};

/// Block Nested-Loop Join Operator.
pub struct BlockNestedLoopJoin {
    // Input operators
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    left_closed: bool,
    right_closed: bool,

    // Join configuration
    name: &'static str,
    left_keys: KeyIndices,
    right_keys: KeyIndices,
    block_pages: usize,
    left_page_capacity: usize,
    right_page_capacity: usize,
    batch_capacity: usize,
    spill: SpillSpace,

    // Output schema
    schema: Schema,

    // Materialized right side
    right_file: Option<SpillFile>,
    right_reader: Option<RunReader>,
    right_page: Vec<Tuple>,
    right_scan_done: bool,

    // Current left block and resume point
    block: Vec<Tuple>,
    left_pending: VecDeque<Tuple>,
    left_cursor: usize,
    right_cursor: usize,

    // State tracking
    opened: bool,
    left_exhausted: bool,
    finished: bool,
}

impl BlockNestedLoopJoin {
    /// Create a block nested-loop join with a budget of `num_buffers` pages.
    ///
    /// # Arguments
    /// * `left` - Outer input, read in blocks of `num_buffers - 2` pages
    /// * `right` - Inner input, materialized into a spill file on open
    /// * `conditions` - Equi-join conditions; left attributes resolve against
    ///   `left`, right attributes against `right`
    /// * `num_buffers` - Page budget, at least 3
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: &[JoinCondition],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        Self::build(left, right, conditions, num_buffers, config, "BlockNestedLoopJoin")
    }

    /// Create a page nested-loop join: the same scan with one-page blocks.
    pub fn page_nested(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: &[JoinCondition],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        let mut join = Self::build(left, right, conditions, num_buffers, config, "NestedLoopJoin")?;
        join.block_pages = 1;
        Ok(join)
    }

    fn build(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: &[JoinCondition],
        num_buffers: usize,
        config: &ExecConfig,
        name: &'static str,
    ) -> Result<Self> {
        if num_buffers < MIN_JOIN_BUFFERS {
            return Err(Error::InsufficientBuffers {
                operator: name,
                required: MIN_JOIN_BUFFERS,
                available: num_buffers,
            });
        }
        let left_keys = left.schema().positions(conditions.iter().map(|c| &c.left))?;
        let right_keys = right.schema().positions(conditions.iter().map(|c| &c.right))?;
        let schema = left.schema().join_with(right.schema());
        let left_page_capacity = Batch::capacity_for(config.page_size, left.schema().tuple_size());
        let right_page_capacity =
            Batch::capacity_for(config.page_size, right.schema().tuple_size());
        let batch_capacity = Batch::capacity_for(config.page_size, schema.tuple_size());

        Ok(Self {
            left,
            right,
            left_closed: true,
            right_closed: true,
            name,
            left_keys,
            right_keys,
            block_pages: num_buffers - 2,
            left_page_capacity,
            right_page_capacity,
            batch_capacity,
            spill: SpillSpace::new(&config.spill_dir, "bnlj"),
            schema,
            right_file: None,
            right_reader: None,
            right_page: Vec::new(),
            right_scan_done: true,
            block: Vec::new(),
            left_pending: VecDeque::new(),
            left_cursor: 0,
            right_cursor: 0,
            opened: false,
            left_exhausted: false,
            finished: false,
        })
    }

    /// Left pages cached per block
    pub fn block_pages(&self) -> usize {
        self.block_pages
    }

    /// Most left tuples held in one block
    pub fn block_capacity(&self) -> usize {
        self.block_pages * self.left_page_capacity
    }

    /// Current resume point `(left_cursor, right_cursor)`
    pub fn cursor(&self) -> (usize, usize) {
        (self.left_cursor, self.right_cursor)
    }

    /// Drain the right child into the spill file
    fn materialize_right(&mut self) -> Result<()> {
        self.right.open()?;
        self.right_closed = false;
        let mut writer = self.spill.create("right")?;
        while let Some(batch) = self.right.next()? {
            writer.write_all(batch.tuples())?;
        }
        self.right_file = Some(writer.finish()?);
        self.right_closed = true;
        self.right.close()
    }

    /// Load the next block of left pages; false once the left side is used up
    fn load_block(&mut self) -> Result<bool> {
        self.block.clear();
        let limit = self.block_capacity();
        while self.block.len() < limit {
            if let Some(tuple) = self.left_pending.pop_front() {
                self.block.push(tuple);
                continue;
            }
            if self.left_exhausted {
                break;
            }
            match self.left.next()? {
                // Overflow past the block waits for the next one
                Some(batch) => self.left_pending.extend(batch),
                None => self.left_exhausted = true,
            }
        }
        Ok(!self.block.is_empty())
    }

    /// Restart the scan of the materialized right side
    fn rewind_right(&mut self) -> Result<()> {
        let file = self
            .right_file
            .as_ref()
            .ok_or_else(|| Error::internal("right side not materialized"))?;
        self.right_reader = Some(file.reader()?);
        self.right_scan_done = false;
        Ok(())
    }

    /// Read the next right page; false at the end of the right scan
    fn read_right_page(&mut self) -> Result<bool> {
        let reader = self
            .right_reader
            .as_mut()
            .ok_or_else(|| Error::internal("right scan not started"))?;
        self.right_page = reader.read_page(self.right_page_capacity)?;
        Ok(!self.right_page.is_empty())
    }

    /// Scan pairs from the cursor until the page is done or `out` fills
    fn scan_page(&mut self, out: &mut Batch) -> Result<()> {
        let block_len = self.block.len();
        let page_len = self.right_page.len();
        let (mut i, mut j) = (self.left_cursor, self.right_cursor);
        loop {
            let l = &self.block[i];
            let r = &self.right_page[j];
            if l.compare_on(&self.left_keys, r, &self.right_keys).is_eq() {
                out.push(l.join_with(r))
                    .map_err(|_| Error::internal("join output page overflow"))?;
            }

            j += 1;
            if j == page_len {
                j = 0;
                i += 1;
                if i == block_len {
                    i = 0;
                }
            }
            if (i, j) == (0, 0) || out.is_full() {
                break;
            }
        }
        self.left_cursor = i;
        self.right_cursor = j;
        Ok(())
    }
}

impl Operator for BlockNestedLoopJoin {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.materialize_right()?;
        self.left.open()?;
        self.left_closed = false;

        self.block.clear();
        self.left_pending.clear();
        self.right_page.clear();
        self.right_reader = None;
        self.right_scan_done = true;
        self.left_cursor = 0;
        self.right_cursor = 0;
        self.left_exhausted = false;
        self.finished = false;
        self.opened = true;
        debug!(
            operator = self.name,
            right_tuples = self.right_file.as_ref().map_or(0, SpillFile::len),
            block_pages = self.block_pages,
            "opened"
        );
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.opened {
            return Err(Error::NotOpen(self.name));
        }
        if self.finished {
            return Ok(None);
        }

        let mut out = Batch::new(self.batch_capacity);
        while !out.is_full() {
            if (self.left_cursor, self.right_cursor) == (0, 0) {
                if self.right_scan_done {
                    if !self.load_block()? {
                        self.finished = true;
                        break;
                    }
                    self.rewind_right()?;
                }
                if !self.read_right_page()? {
                    self.right_scan_done = true;
                    continue;
                }
            }
            self.scan_page(&mut out)?;
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
        self.right_reader = None;
        self.block.clear();
        self.left_pending.clear();
        self.right_page.clear();

        let removed = match self.right_file.take() {
            Some(file) => file.remove(),
            None => Ok(()),
        };
        let left = if self.left_closed {
            Ok(())
        } else {
            self.left_closed = true;
            self.left.close()
        };
        let right = if self.right_closed {
            Ok(())
        } else {
            self.right_closed = true;
            self.right.close()
        };
        debug!(operator = self.name, "closed");
        removed.and(left).and(right)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Attribute, DataType, SchemaBuilder, Value};
    use crate::executor::operator::{collect_tuples, MaterializedOperator};

    // One integer pair per side: 8-byte tuples. A 16-byte page holds two
    // input tuples and one joined tuple, so the output fills on every match.
    const PAGE: usize = 16;

    fn make_operator(table: &str, data: Vec<(i64, i64)>) -> Box<dyn Operator> {
        let schema = SchemaBuilder::new(table)
            .add("k", DataType::Integer)
            .add("v", DataType::Integer)
            .build();
        let tuples = data
            .into_iter()
            .map(|(k, v)| Tuple::from_values(vec![Value::integer(k), Value::integer(v)]))
            .collect();
        Box::new(MaterializedOperator::new(tuples, schema, PAGE))
    }

    fn on_k() -> Vec<JoinCondition> {
        vec![JoinCondition::new(
            Attribute::new("l", "k", DataType::Integer),
            Attribute::new("r", "k", DataType::Integer),
        )]
    }

    fn values(tuples: &[Tuple]) -> Vec<(i64, i64)> {
        let mut out: Vec<_> = tuples
            .iter()
            .map(|t| (t[1].as_int64().unwrap(), t[3].as_int64().unwrap()))
            .collect();
        out.sort();
        out
    }

    fn reference(left: &[(i64, i64)], right: &[(i64, i64)]) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        for l in left {
            for r in right {
                if l.0 == r.0 {
                    out.push((l.1, r.1));
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn test_matches_reference_join() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        let left: Vec<_> = (0..13).map(|i| (i % 4, i)).collect();
        let right: Vec<_> = (0..9).map(|i| (i % 3, 100 + i)).collect();

        for buffers in 3..6 {
            let mut join = BlockNestedLoopJoin::new(
                make_operator("l", left.clone()),
                make_operator("r", right.clone()),
                &on_k(),
                buffers,
                &config,
            )
            .unwrap();
            let out = collect_tuples(&mut join).unwrap();
            assert_eq!(values(&out), reference(&left, &right), "buffers = {}", buffers);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_page_nested_variant() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        let left = vec![(1, 1), (2, 2), (1, 3), (3, 4), (1, 5)];
        let right = vec![(1, 10), (1, 11), (3, 12)];
        let mut join = BlockNestedLoopJoin::page_nested(
            make_operator("l", left.clone()),
            make_operator("r", right.clone()),
            &on_k(),
            8,
            &config,
        )
        .unwrap();
        assert_eq!(join.block_pages(), 1);
        assert_eq!(join.name(), "NestedLoopJoin");
        let out = collect_tuples(&mut join).unwrap();
        assert_eq!(values(&out), reference(&left, &right));
    }

    #[test]
    fn test_block_ignores_oversized_child_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        let left: Vec<_> = (0..11).map(|i| (i % 3, i)).collect();
        let right = vec![(0, 100), (1, 101), (2, 102)];
        let schema = SchemaBuilder::new("l")
            .add("k", DataType::Integer)
            .add("v", DataType::Integer)
            .build();
        let tuples = left
            .iter()
            .map(|&(k, v)| Tuple::from_values(vec![Value::integer(k), Value::integer(v)]))
            .collect();
        // Ten tuples per batch against a page of two
        let wide = MaterializedOperator::with_batch_capacity(tuples, schema, 10);

        let mut join = BlockNestedLoopJoin::new(
            Box::new(wide),
            make_operator("r", right.clone()),
            &on_k(),
            3,
            &config,
        )
        .unwrap();
        assert_eq!(join.block_capacity(), 2);

        join.open().unwrap();
        let mut out = Vec::new();
        while let Some(batch) = join.next().unwrap() {
            assert!(join.block.len() <= 2);
            out.extend(batch);
        }
        join.close().unwrap();
        assert_eq!(values(&out), reference(&left, &right));
    }

    #[test]
    fn test_resume_after_full_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        // Every pair matches; one joined tuple per output page
        let left = vec![(0, 1), (0, 2)];
        let right = vec![(0, 10), (0, 20)];
        let mut join = BlockNestedLoopJoin::new(
            make_operator("l", left),
            make_operator("r", right),
            &on_k(),
            3,
            &config,
        )
        .unwrap();
        join.open().unwrap();

        let mut seen = Vec::new();
        let mut cursors = Vec::new();
        while let Some(batch) = join.next().unwrap() {
            assert_eq!(batch.len(), 1);
            let t = &batch.tuples()[0];
            seen.push((t[1].as_int64().unwrap(), t[3].as_int64().unwrap()));
            cursors.push(join.cursor());
        }
        assert_eq!(seen, vec![(1, 10), (1, 20), (2, 10), (2, 20)]);
        assert_eq!(cursors, vec![(0, 1), (1, 0), (1, 1), (0, 0)]);
        assert!(join.next().unwrap().is_none());
        join.close().unwrap();
    }

    #[test]
    fn test_empty_sides() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        let mut join = BlockNestedLoopJoin::new(
            make_operator("l", vec![(1, 1)]),
            make_operator("r", vec![]),
            &on_k(),
            3,
            &config,
        )
        .unwrap();
        assert!(collect_tuples(&mut join).unwrap().is_empty());

        let mut join = BlockNestedLoopJoin::new(
            make_operator("l", vec![]),
            make_operator("r", vec![(1, 1)]),
            &on_k(),
            3,
            &config,
        )
        .unwrap();
        assert!(collect_tuples(&mut join).unwrap().is_empty());
    }

    #[test]
    fn test_two_joins_keep_separate_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir.path());
        let data: Vec<_> = (0..6).map(|i| (i % 2, i)).collect();
        let mut a = BlockNestedLoopJoin::new(
            make_operator("l", data.clone()),
            make_operator("r", data.clone()),
            &on_k(),
            3,
            &config,
        )
        .unwrap();
        let mut b = BlockNestedLoopJoin::new(
            make_operator("l", data.clone()),
            make_operator("r", data.clone()),
            &on_k(),
            4,
            &config,
        )
        .unwrap();
        a.open().unwrap();
        b.open().unwrap();
        let (mut out_a, mut out_b) = (Vec::new(), Vec::new());
        loop {
            let na = a.next().unwrap();
            let nb = b.next().unwrap();
            if na.is_none() && nb.is_none() {
                break;
            }
            out_a.extend(na.into_iter().flatten());
            out_b.extend(nb.into_iter().flatten());
        }
        a.close().unwrap();
        b.close().unwrap();
        assert_eq!(values(&out_a), reference(&data, &data));
        assert_eq!(values(&out_b), reference(&data, &data));
    }

    #[test]
    fn test_rejects_small_budget() {
        let config = ExecConfig::default().with_page_size(PAGE);
        let result = BlockNestedLoopJoin::new(
            make_operator("l", vec![]),
            make_operator("r", vec![]),
            &on_k(),
            2,
            &config,
        );
        assert!(matches!(
            result,
            Err(Error::InsufficientBuffers { required: 3, available: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_join_attribute() {
        let config = ExecConfig::default().with_page_size(PAGE);
        let cond = vec![JoinCondition::new(
            Attribute::new("l", "nope", DataType::Integer),
            Attribute::new("r", "k", DataType::Integer),
        )];
        let result = BlockNestedLoopJoin::new(
            make_operator("l", vec![]),
            make_operator("r", vec![]),
            &cond,
            3,
            &config,
        );
        assert!(matches!(result, Err(Error::AttributeNotFound(_))));
    }
}
