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

//! Execution engine configuration
//!
//! [`ExecConfig`] carries the page size, spill directory and page budgets;
//! [`BufferBudget`] is how the plan compiler reads those budgets.

use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// Smallest page budget a join can run with: one left page, one right page
/// and one output page
pub const MIN_JOIN_BUFFERS: usize = 3;

/// Page budgets handed to operators when a plan is compiled
///
/// The allocation policy itself is decided by the caller; operators only
/// read the numbers.
pub trait BufferBudget {
    /// Pages available to a sort, distinct or order-by subtree
    fn num_buffers(&self) -> usize;

    /// Pages available to each join
    fn buffers_per_join(&self) -> usize;
}

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Size of a page in bytes; batch capacity is `page_size / tuple_size`
    /// Default: 4096
    pub page_size: usize,

    /// Directory for spill files
    /// Default: the OS temporary directory
    pub spill_dir: PathBuf,

    /// Page budget for sort, distinct and order-by operators
    /// Default: 32
    pub num_buffers: usize,

    /// Page budget for each join operator
    /// Default: 8
    pub buffers_per_join: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            spill_dir: std::env::temp_dir(),
            num_buffers: 32,
            buffers_per_join: 8,
        }
    }
}

impl ExecConfig {
    /// Creates a configuration spilling into `dir`
    pub fn with_spill_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.spill_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Builder method to set the page size in bytes
    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    /// Builder method to set the sort page budget
    pub fn with_num_buffers(mut self, pages: usize) -> Self {
        self.num_buffers = pages;
        self
    }

    /// Builder method to set the per-join page budget
    pub fn with_buffers_per_join(mut self, pages: usize) -> Self {
        self.buffers_per_join = pages;
        self
    }

    /// Rejects settings no operator can run with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfig("page_size must be positive".into()));
        }
        if self.num_buffers == 0 {
            return Err(Error::InvalidConfig("num_buffers must be positive".into()));
        }
        if self.buffers_per_join == 0 {
            return Err(Error::InvalidConfig(
                "buffers_per_join must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl BufferBudget for ExecConfig {
    fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    fn buffers_per_join(&self) -> usize {
        self.buffers_per_join
    }
}

/// Splits a total page count evenly across the joins of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBudget {
    total: usize,
    per_join: usize,
}

impl UniformBudget {
    /// Divide `total` pages across `num_joins` joins, never below
    /// [`MIN_JOIN_BUFFERS`] per join
    pub fn split(total: usize, num_joins: usize) -> Self {
        let per_join = if num_joins == 0 {
            total
        } else {
            total / num_joins
        };
        Self {
            total,
            per_join: per_join.max(MIN_JOIN_BUFFERS),
        }
    }
}

impl BufferBudget for UniformBudget {
    fn num_buffers(&self) -> usize {
        self.total
    }

    fn buffers_per_join(&self) -> usize {
        self.per_join
    }
}
