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

//! Query operators for bounded-memory execution.
//!
//! Each operator implements the `Operator` trait with the `open()`, `next()`,
//! `close()` lifecycle and stays within the page budget it was built with.
//!
//! # Available Operators
//!
//! ## Join Operators
//!
//! - `BlockNestedLoopJoin` - Inner side spilled once, outer side in blocks of `B - 2` pages
//! - `BlockNestedLoopJoin::page_nested` - The same scan with one-page blocks
//! - `SortMergeJoin` - Both sides externally sorted, merged one right partition at a time
//!
//! ## Sort Consumers
//!
//! - `Distinct` - Adjacent-duplicate elimination over the sorted stream
//! - `OrderBy` - The sorted stream itself
//!
//! # Algorithm Selection
//!
//! | Condition | Recommended Operator |
//! |-----------|---------------------|
//! | Small inner side | `BlockNestedLoopJoin` |
//! | Large inputs, few duplicate keys | `SortMergeJoin` |
//! | Skewed keys (partition over `B - 2` pages) | `BlockNestedLoopJoin` |
//! | Minimal memory | `BlockNestedLoopJoin::page_nested` |

pub mod block_nested_loop;
pub mod distinct;
pub mod order_by;
pub mod sort_merge_join;

// Re-export all operators
pub use block_nested_loop::BlockNestedLoopJoin;
pub use distinct::Distinct;
pub use order_by::OrderBy;
pub use sort_merge_join::SortMergeJoin;
