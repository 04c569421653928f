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

//! Query Executor
//!
//! This module provides the pull-based execution engine.
//!
//! # Architecture
//!
//! Operators form a tree; the driver pulls batches from the root and every
//! operator pulls from its children only as much as it needs:
//!
//! ```text
//! Scan / Select / Project   (caller supplied)
//!   ↓
//! BlockNestedLoopJoin | SortMergeJoin
//!   ↓
//! Distinct | OrderBy
//!   ↓
//! Driver
//! ```
//!
//! # Components
//!
//! - [`Operator`] - The open/next/close interface
//! - [`ExternalSort`] - Multi-pass merge sort with spill files
//! - [`operators`] - Joins, distinct and order-by
//! - [`MaterializedOperator`] - In-memory source

pub mod operator;
pub mod operators;
pub mod sort;

pub use operator::{collect_tuples, MaterializedOperator, Operator};
pub use operators::{BlockNestedLoopJoin, Distinct, OrderBy, SortMergeJoin};
pub use sort::ExternalSort;
