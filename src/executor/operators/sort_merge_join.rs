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

//! Sort-Merge Join Operator.
//!
//! Both inputs go through the external sort on their join keys, then the
//! two sorted streams are merged. The right stream is consumed one
//! *partition* at a time: the maximal run of right tuples sharing a key.
//!
//! For left keys `[1, 1, 2]` and right keys `[1, 1, 1, 2]` the output is
//! each left tuple against its whole partition, in order:
//!
//! ```text
//! l1a×r1a l1a×r1b l1a×r1c  l1b×r1a l1b×r1b l1b×r1c  l2×r2
//! ```
//!
//! When a left tuple has been paired with the whole partition, the next
//! left tuple is compared with the previous *left* tuple on the left keys.
//! Equal keys replay the same partition; a new key moves on to the next
//! partition.
//!
//! A partition has to fit in `B - 2` pages. A larger one aborts the join
//! with [`Error::ResourceExhausted`].

use std::cmp::Ordering;
use std::collections::VecDeque;

use tracing::debug;

use crate::core::{Batch, Error, JoinCondition, KeyIndices, Result, Schema, Tuple};
use crate::executor::operator::Operator;
use crate::executor::sort::ExternalSort;
use crate::storage::{ExecConfig, MIN_JOIN_BUFFERS};

/// Sort-Merge Join Operator.
pub struct SortMergeJoin {
    // Sorted inputs
    left: ExternalSort,
    right: ExternalSort,

    // Join configuration
    left_keys: KeyIndices,
    right_keys: KeyIndices,
    partition_limit: usize,
    batch_capacity: usize,

    // Output schema
    schema: Schema,

    // Current pages of the sorted inputs
    left_page: VecDeque<Tuple>,
    right_page: VecDeque<Tuple>,
    left_done: bool,
    right_done: bool,

    // Merge state
    left_tuple: Option<Tuple>,
    partition: Vec<Tuple>,
    partition_index: usize,
    right_lookahead: Option<Tuple>,
    failure: Option<Error>,

    // State tracking
    opened: bool,
    primed: bool,
    finished: bool,
}

impl SortMergeJoin {
    /// Create a sort-merge join with a budget of `num_buffers` pages.
    ///
    /// The budget is also what each side's sort gets, and bounds a right
    /// partition to `num_buffers - 2` pages.
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        conditions: &[JoinCondition],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        if num_buffers < MIN_JOIN_BUFFERS {
            return Err(Error::InsufficientBuffers {
                operator: "SortMergeJoin",
                required: MIN_JOIN_BUFFERS,
                available: num_buffers,
            });
        }
        let left_keys = left.schema().positions(conditions.iter().map(|c| &c.left))?;
        let right_keys = right.schema().positions(conditions.iter().map(|c| &c.right))?;
        let schema = left.schema().join_with(right.schema());
        let batch_capacity = Batch::capacity_for(config.page_size, schema.tuple_size());

        let left = ExternalSort::with_key_indices(left, left_keys.clone(), num_buffers, config)?;
        let right = ExternalSort::with_key_indices(right, right_keys.clone(), num_buffers, config)?;
        let partition_limit = (num_buffers - 2) * right.batch_capacity();

        Ok(Self {
            left,
            right,
            left_keys,
            right_keys,
            partition_limit,
            batch_capacity,
            schema,
            left_page: VecDeque::new(),
            right_page: VecDeque::new(),
            left_done: false,
            right_done: false,
            left_tuple: None,
            partition: Vec::new(),
            partition_index: 0,
            right_lookahead: None,
            failure: None,
            opened: false,
            primed: false,
            finished: false,
        })
    }

    /// Most right tuples a partition may hold
    pub fn partition_limit(&self) -> usize {
        self.partition_limit
    }

    fn next_left(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.left_page.pop_front() {
                return Ok(Some(tuple));
            }
            if self.left_done {
                return Ok(None);
            }
            match self.left.next()? {
                Some(batch) => self.left_page = batch.into_tuples().into(),
                None => self.left_done = true,
            }
        }
    }

    fn next_right(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.right_page.pop_front() {
                return Ok(Some(tuple));
            }
            if self.right_done {
                return Ok(None);
            }
            match self.right.next()? {
                Some(batch) => self.right_page = batch.into_tuples().into(),
                None => self.right_done = true,
            }
        }
    }

    /// Materialize the next right partition; false when the right side ends
    fn next_partition(&mut self) -> Result<bool> {
        self.partition.clear();
        self.partition_index = 0;
        let first = match self.right_lookahead.take() {
            Some(tuple) => tuple,
            None => match self.next_right()? {
                Some(tuple) => tuple,
                None => return Ok(false),
            },
        };
        self.partition.push(first);
        loop {
            match self.next_right()? {
                Some(tuple) if tuple.compare_keys(&self.partition[0], &self.right_keys).is_eq() => {
                    if self.partition.len() >= self.partition_limit {
                        return Err(Error::ResourceExhausted {
                            resource: "sort-merge right partition",
                            limit: self.partition_limit,
                            requested: self.partition.len() + 1,
                        });
                    }
                    self.partition.push(tuple);
                }
                Some(tuple) => {
                    self.right_lookahead = Some(tuple);
                    break;
                }
                None => break,
            }
        }
        Ok(true)
    }

    /// Pair the current left tuple with the next partition tuple, then
    /// advance. Returns false when the join is complete.
    fn emit_and_advance(&mut self, out: &mut Batch) -> Result<bool> {
        let joined = match &self.left_tuple {
            Some(left) => left.join_with(&self.partition[self.partition_index]),
            None => return Ok(false),
        };
        out.push(joined)
            .map_err(|_| Error::internal("join output page overflow"))?;

        self.partition_index += 1;
        if self.partition_index < self.partition.len() {
            return Ok(true);
        }

        let previous = self.left_tuple.take();
        self.left_tuple = self.next_left()?;
        match (&previous, &self.left_tuple) {
            (_, None) => Ok(false),
            (Some(prev), Some(next)) if prev.compare_keys(next, &self.left_keys).is_eq() => {
                self.partition_index = 0;
                Ok(true)
            }
            _ => self.next_partition(),
        }
    }

    /// Fill one output page from the merge
    fn merge_page(&mut self) -> Result<Option<Batch>> {
        if !self.primed {
            self.primed = true;
            self.left_tuple = self.next_left()?;
            if self.left_tuple.is_none() || !self.next_partition()? {
                self.finished = true;
                return Ok(None);
            }
        }

        let mut out = Batch::new(self.batch_capacity);
        while !out.is_full() {
            let ord = match &self.left_tuple {
                Some(left) => {
                    left.compare_on(&self.left_keys, &self.partition[0], &self.right_keys)
                }
                None => {
                    self.finished = true;
                    break;
                }
            };
            let more = match ord {
                Ordering::Equal => self.emit_and_advance(&mut out)?,
                Ordering::Less => {
                    self.left_tuple = self.next_left()?;
                    self.left_tuple.is_some()
                }
                Ordering::Greater => self.next_partition()?,
            };
            if !more {
                self.finished = true;
                break;
            }
        }

        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }
}

impl Operator for SortMergeJoin {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.left.open()?;
        self.right.open()?;
        self.left_page.clear();
        self.right_page.clear();
        self.left_done = false;
        self.right_done = false;
        self.left_tuple = None;
        self.partition.clear();
        self.partition_index = 0;
        self.right_lookahead = None;
        self.failure = None;
        self.primed = false;
        self.finished = false;
        self.opened = true;
        debug!(
            operator = "SortMergeJoin",
            partition_limit = self.partition_limit,
            left_merge_passes = self.left.merge_passes(),
            right_merge_passes = self.right.merge_passes(),
            "opened"
        );
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.opened {
            return Err(Error::NotOpen("SortMergeJoin"));
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.finished {
            return Ok(None);
        }
        match self.merge_page() {
            Err(err) => {
                // Partial state is unusable after a failure
                self.finished = true;
                self.failure = Some(err.clone());
                Err(err)
            }
            page => page,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.finished = true;
        self.left_page.clear();
        self.right_page.clear();
        self.partition.clear();
        self.left_tuple = None;
        self.right_lookahead = None;
        let left = self.left.close();
        let right = self.right.close();
        debug!(operator = "SortMergeJoin", "closed");
        left.and(right)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        "SortMergeJoin"
    }
}
