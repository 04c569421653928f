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

//! External merge sort.
//!
//! Sorts an input stream of any size within a budget of `B` pages:
//!
//! | Phase      | Memory                              | Output                    |
//! |------------|-------------------------------------|---------------------------|
//! | Pass 0     | `B` pages of tuples, sorted in place | `⌈N / B⌉` sorted runs     |
//! | Pass 1..k  | `B - 1` input pages + 1 output page  | runs merged `B - 1` at a time |
//! | Final scan | 1 page                              | batches in key order      |
//!
//! Merging is driven by a min-heap holding the current candidate tuple of
//! every run in the merge window. When a run's page is used up, its next
//! page is read before the run competes again. Ties are broken by run
//! number, so the sort is stable: equal keys keep their input order.
//!
//! Every run lives in a spill file until it is merged or until `close()`.
//! A merge window always holds at least two runs, so budgets below three
//! pages merge two runs at a time.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use tracing::debug;

use crate::core::{Attribute, Batch, Error, KeyIndices, Result, Schema, Tuple};
use crate::executor::operator::Operator;
use crate::storage::spill::{remove_all, RunReader, SpillFile, SpillSpace};
use crate::storage::ExecConfig;

/// Candidate tuple of one run inside the merge window
struct HeapEntry<'a> {
    tuple: Tuple,
    run: usize,
    keys: &'a [usize],
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    // Reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .tuple
            .compare_keys(&self.tuple, self.keys)
            .then_with(|| other.run.cmp(&self.run))
    }
}

/// External merge sort operator.
pub struct ExternalSort {
    // Input operator
    input: Box<dyn Operator>,
    input_closed: bool,

    // Sort configuration
    keys: KeyIndices,
    num_buffers: usize,
    batch_capacity: usize,
    spill: SpillSpace,

    // Live run files; after open() this is the single final run, if any
    runs: Vec<SpillFile>,
    output: Option<RunReader>,
    merge_passes: usize,

    // State tracking
    opened: bool,
    exhausted: bool,
}

impl ExternalSort {
    /// Create a sort of `input` on `keys` with a budget of `num_buffers` pages.
    ///
    /// Fails if a key is not in the input schema or the budget is zero.
    pub fn new(
        input: Box<dyn Operator>,
        keys: &[Attribute],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        let keys = input.schema().positions(keys)?;
        Self::with_key_indices(input, keys, num_buffers, config)
    }

    /// Create a sort on already resolved key positions.
    pub fn with_key_indices(
        input: Box<dyn Operator>,
        keys: KeyIndices,
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        if num_buffers == 0 {
            return Err(Error::InsufficientBuffers {
                operator: "ExternalSort",
                required: 1,
                available: 0,
            });
        }
        if let Some(&bad) = keys.iter().find(|&&k| k >= input.schema().len()) {
            return Err(Error::attribute_not_found(format!("#{}", bad)));
        }
        let batch_capacity = Batch::capacity_for(config.page_size, input.schema().tuple_size());
        Ok(Self {
            input,
            input_closed: false,
            keys,
            num_buffers,
            batch_capacity,
            spill: SpillSpace::new(&config.spill_dir, "sort"),
            runs: Vec::new(),
            output: None,
            merge_passes: 0,
            opened: false,
            exhausted: false,
        })
    }

    /// Key positions the stream is ordered by
    pub fn keys(&self) -> &[usize] {
        &self.keys
    }

    /// Tuples per output batch
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Number of merge passes `open()` needed
    pub fn merge_passes(&self) -> usize {
        self.merge_passes
    }

    /// Runs merged together in one step
    fn fan_in(&self) -> usize {
        (self.num_buffers - 1).max(2)
    }

    /// Sort a chunk in memory and write it out as a pass-0 run
    fn spill_run(&self, chunk: &mut Vec<Tuple>, run: usize) -> Result<SpillFile> {
        let keys = &self.keys;
        chunk.sort_by(|a, b| a.compare_keys(b, keys));
        let mut writer = self.spill.create(&format!("p0-r{}", run))?;
        writer.write_all(chunk)?;
        chunk.clear();
        writer.finish()
    }

    /// Pass 0: cut the input into sorted runs of `B` pages each
    fn generate_runs(&mut self) -> Result<Vec<SpillFile>> {
        let chunk_limit = self.num_buffers * self.batch_capacity;
        let mut chunk = Vec::new();
        let mut runs = Vec::new();
        while let Some(batch) = self.input.next()? {
            for tuple in batch {
                chunk.push(tuple);
                if chunk.len() == chunk_limit {
                    runs.push(self.spill_run(&mut chunk, runs.len())?);
                }
            }
        }
        if !chunk.is_empty() {
            runs.push(self.spill_run(&mut chunk, runs.len())?);
        }
        Ok(runs)
    }

    /// Merge one window of runs into a single run
    fn merge_window(&self, window: &[SpillFile], pass: usize, run: usize) -> Result<SpillFile> {
        let cap = self.batch_capacity;
        let mut readers = window
            .iter()
            .map(SpillFile::reader)
            .collect::<Result<Vec<_>>>()?;
        let mut pages: Vec<VecDeque<Tuple>> = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (idx, reader) in readers.iter_mut().enumerate() {
            let mut page: VecDeque<Tuple> = reader.read_page(cap)?.into();
            if let Some(tuple) = page.pop_front() {
                heap.push(HeapEntry {
                    tuple,
                    run: idx,
                    keys: &self.keys,
                });
            }
            pages.push(page);
        }

        let mut writer = self.spill.create(&format!("p{}-r{}", pass, run))?;
        let mut out_page = Vec::with_capacity(cap);
        while let Some(HeapEntry { tuple, run: idx, .. }) = heap.pop() {
            out_page.push(tuple);
            if out_page.len() == cap {
                writer.write_all(&out_page)?;
                out_page.clear();
            }
            if pages[idx].is_empty() {
                pages[idx] = readers[idx].read_page(cap)?.into();
            }
            if let Some(next) = pages[idx].pop_front() {
                heap.push(HeapEntry {
                    tuple: next,
                    run: idx,
                    keys: &self.keys,
                });
            }
        }
        writer.write_all(&out_page)?;
        writer.finish()
    }

    /// Passes 1..k: merge until at most one run remains
    fn merge_runs(&mut self, runs: Vec<SpillFile>) -> Result<Vec<SpillFile>> {
        let fan_in = self.fan_in();
        let mut runs = runs;
        let mut pass = 0;
        while runs.len() > 1 {
            pass += 1;
            debug!(operator = "ExternalSort", pass, runs = runs.len(), fan_in, "merge pass");
            let mut pending: VecDeque<SpillFile> = runs.into();
            let mut merged = Vec::with_capacity(pending.len().div_ceil(fan_in));
            while !pending.is_empty() {
                let window: Vec<SpillFile> = pending.drain(..fan_in.min(pending.len())).collect();
                if window.len() == 1 {
                    merged.extend(window);
                    continue;
                }
                merged.push(self.merge_window(&window, pass, merged.len())?);
                remove_all(window)?;
            }
            runs = merged;
        }
        self.merge_passes = pass;
        Ok(runs)
    }
}

impl Operator for ExternalSort {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.input.open()?;
        self.input_closed = false;

        let runs = self.generate_runs()?;
        self.input.close()?;
        self.input_closed = true;
        debug!(
            operator = "ExternalSort",
            runs = runs.len(),
            buffers = self.num_buffers,
            "generated sorted runs"
        );

        self.runs = self.merge_runs(runs)?;
        self.output = match self.runs.first() {
            Some(run) => Some(run.reader()?),
            None => None,
        };
        self.exhausted = self.output.is_none();
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        if !self.opened {
            return Err(Error::NotOpen("ExternalSort"));
        }
        if self.exhausted {
            return Ok(None);
        }
        let reader = match self.output.as_mut() {
            Some(reader) => reader,
            None => {
                self.exhausted = true;
                return Ok(None);
            }
        };
        let page = reader.read_page(self.batch_capacity)?;
        if page.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(Batch::from_tuples(self.batch_capacity, page)))
    }

    fn close(&mut self) -> Result<()> {
        self.output = None;
        self.exhausted = true;
        self.opened = false;
        let removed = remove_all(std::mem::take(&mut self.runs));
        let closed = if self.input_closed {
            Ok(())
        } else {
            self.input_closed = true;
            self.input.close()
        };
        debug!(operator = "ExternalSort", "closed");
        removed?;
        closed
    }

    fn schema(&self) -> &Schema {
        self.input.schema()
    }

    fn name(&self) -> &str {
        "ExternalSort"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, SchemaBuilder, Value};
    use crate::executor::operator::{collect_tuples, MaterializedOperator};

    // Two integer columns: 8 bytes per tuple, so a 16-byte page holds 2 tuples
    const PAGE: usize = 16;

    fn schema() -> Schema {
        SchemaBuilder::new("t")
            .add("k", DataType::Integer)
            .add("v", DataType::Integer)
            .build()
    }

    fn make_operator(data: Vec<(i64, i64)>) -> Box<dyn Operator> {
        let tuples = data
            .into_iter()
            .map(|(k, v)| Tuple::from_values(vec![Value::integer(k), Value::integer(v)]))
            .collect();
        Box::new(MaterializedOperator::new(tuples, schema(), PAGE))
    }

    fn key() -> Vec<Attribute> {
        vec![Attribute::new("t", "k", DataType::Integer)]
    }

    fn config(dir: &std::path::Path) -> ExecConfig {
        ExecConfig::default().with_page_size(PAGE).with_spill_dir(dir)
    }

    fn pairs(tuples: &[Tuple]) -> Vec<(i64, i64)> {
        tuples
            .iter()
            .map(|t| (t[0].as_int64().unwrap(), t[1].as_int64().unwrap()))
            .collect()
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_sort_multi_pass() {
        let dir = tempfile::tempdir().unwrap();
        // 41 tuples, B = 3: pass 0 makes 7 runs of 6, then 7 -> 4 -> 2 -> 1
        let data: Vec<_> = (0..41).map(|i| ((i * 17) % 41, i)).collect();
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(data), &key(), 3, &config).unwrap();
        let out = collect_tuples(&mut sort).unwrap();
        let keys: Vec<_> = pairs(&out).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, (0..41).collect::<Vec<_>>());
        assert_eq!(sort.merge_passes(), 3);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_sort_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<_> = (0..20).map(|i| (i % 3, i)).collect();
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(data), &key(), 2, &config).unwrap();
        let out = pairs(&collect_tuples(&mut sort).unwrap());
        let mut expected: Vec<_> = (0..20).map(|i| (i % 3, i)).collect();
        expected.sort_by_key(|&(k, _)| k);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_fits_in_budget_needs_no_merge() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![(3, 0), (1, 0), (2, 0)];
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(data), &key(), 4, &config).unwrap();
        sort.open().unwrap();
        assert_eq!(sort.merge_passes(), 0);
        assert_eq!(files_in(dir.path()), 1);
        let first = sort.next().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.capacity(), 2);
        sort.close().unwrap();
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn test_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(vec![]), &key(), 3, &config).unwrap();
        sort.open().unwrap();
        assert!(sort.next().unwrap().is_none());
        assert!(sort.next().unwrap().is_none());
        assert_eq!(files_in(dir.path()), 0);
        sort.close().unwrap();
    }

    #[test]
    fn test_close_mid_stream_removes_runs() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<_> = (0..30).rev().map(|i| (i, i)).collect();
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(data), &key(), 3, &config).unwrap();
        sort.open().unwrap();
        assert!(sort.next().unwrap().is_some());
        assert!(files_in(dir.path()) > 0);
        sort.close().unwrap();
        assert_eq!(files_in(dir.path()), 0);
        // Closing twice is harmless
        sort.close().unwrap();
    }

    #[test]
    fn test_unknown_key_and_zero_budget() {
        let dir = tempfile::tempdir().unwrap();
        let bad = vec![Attribute::new("t", "missing", DataType::Integer)];
        assert!(matches!(
            ExternalSort::new(make_operator(vec![]), &bad, 3, &config(dir.path())),
            Err(Error::AttributeNotFound(_))
        ));
        assert!(matches!(
            ExternalSort::new(make_operator(vec![]), &key(), 0, &config(dir.path())),
            Err(Error::InsufficientBuffers { .. })
        ));
    }

    #[test]
    fn test_next_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut sort = ExternalSort::new(make_operator(vec![]), &key(), 3, &config).unwrap();
        assert_eq!(sort.next(), Err(Error::NotOpen("ExternalSort")));
    }
}
