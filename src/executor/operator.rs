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

//! Volcano-style operator interface for batch-at-a-time execution.
//!
//! Operators pull batches on demand from their children. A parent's `next()`
//! drives exactly as many child `next()` calls as it needs to fill one
//! output batch, and every operator holds at most its page budget of tuples
//! in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Consumer     │ ← Pulls batches via next()
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │ Join Op      │ ← BNLJ: right side spilled, left side in blocks
//! └──────┬───────┘   SMJ: both sides through the external sort
//!        │
//! ┌──────┴──────┐
//! │             │
//! ▼             ▼
//! ┌─────┐   ┌─────┐
//! │Scan │   │Scan │ ← Supplied by the caller
//! └─────┘   └─────┘
//! ```

use crate::core::{Batch, Result, Schema, Tuple};

/// Volcano-style iterator interface for query operators.
///
/// The execution follows the open-next-close pattern:
///
/// 1. `open()` - Initialize the operator (called once)
/// 2. `next()` - Get the next batch (called repeatedly until None)
/// 3. `close()` - Release resources, including spill files (called once)
///
/// # Thread Safety
///
/// Operators are `Send` so a plan can be built on one thread and run on
/// another, but an operator is never driven from two threads at once.
pub trait Operator: Send {
    /// Initialize the operator.
    ///
    /// Child operators are opened here. Blocking operators (sorts, the
    /// inner side of a block nested-loop join) consume their input here.
    fn open(&mut self) -> Result<()>;

    /// Get the next batch from this operator.
    ///
    /// Returns:
    /// - `Ok(Some(batch))` - A non-empty batch is available
    /// - `Ok(None)` - No more tuples (exhausted)
    /// - `Err(e)` - An error occurred
    ///
    /// After returning `None`, subsequent calls continue to return `None`.
    fn next(&mut self) -> Result<Option<Batch>>;

    /// Close the operator and release resources.
    ///
    /// Deletes every spill file the operator created and closes its
    /// children. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    /// Layout of the tuples this operator produces.
    fn schema(&self) -> &Schema;

    /// Get a descriptive name for this operator (for logs and plan output).
    fn name(&self) -> &str;
}

/// Pull every tuple out of an operator: open, drain, close.
///
/// The operator is closed even when draining fails; the drain error wins.
pub fn collect_tuples(op: &mut dyn Operator) -> Result<Vec<Tuple>> {
    op.open()?;
    let mut tuples = Vec::new();
    let drained = loop {
        match op.next() {
            Ok(Some(batch)) => tuples.extend(batch),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let closed = op.close();
    drained?;
    closed?;
    Ok(tuples)
}

/// Operator that streams pre-materialized tuples in pages.
///
/// Stands in for a base-table scan, and feeds tests.
pub struct MaterializedOperator {
    tuples: Vec<Tuple>,
    schema: Schema,
    batch_capacity: usize,
    position: usize,
    opened: bool,
}

impl MaterializedOperator {
    /// Create an operator whose pages hold `page_size / tuple_size` tuples.
    pub fn new(tuples: Vec<Tuple>, schema: Schema, page_size: usize) -> Self {
        let batch_capacity = Batch::capacity_for(page_size, schema.tuple_size());
        Self::with_batch_capacity(tuples, schema, batch_capacity)
    }

    /// Create an operator with an explicit batch capacity.
    pub fn with_batch_capacity(tuples: Vec<Tuple>, schema: Schema, batch_capacity: usize) -> Self {
        Self {
            tuples,
            schema,
            batch_capacity: batch_capacity.max(1),
            position: 0,
            opened: false,
        }
    }
}

impl Operator for MaterializedOperator {
    fn open(&mut self) -> Result<()> {
        self.position = 0;
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.opened {
            return Err(crate::core::Error::NotOpen("MaterializedOperator"));
        }
        if self.position >= self.tuples.len() {
            return Ok(None);
        }
        let end = (self.position + self.batch_capacity).min(self.tuples.len());
        let page = self.tuples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(Batch::from_tuples(self.batch_capacity, page)))
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &str {
        "Materialized"
    }
}
