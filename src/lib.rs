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

//! # Spillway - bounded-memory query execution
//!
//! Spillway is an embeddable query-execution engine. Operators pull
//! fixed-capacity batches through an open/next/close protocol and never
//! hold more than their page budget in memory; anything larger spills to
//! disk. On top of the operators sits a randomized join-order optimizer.
//!
//! ## Key Features
//!
//! - **External sort** - Multi-pass run generation and bounded k-way merge
//! - **Block nested-loop join** - Resumable block/page cursor over a spilled inner side
//! - **Sort-merge join** - Key partitions merged over two external sorts
//! - **Distinct and order-by** - Single-pass consumers of the sort
//! - **Randomized optimizer** - Iterative improvement plus simulated annealing
//!
//! ## Quick Start
//!
//! ```rust
//! use spillway::optimizer::{make_exec_plan, JoinAlgorithm, MemorySource, PlanBuilder};
//! use spillway::{collect_tuples, Attribute, DataType, ExecConfig, JoinCondition};
//! use spillway::{SchemaBuilder, Tuple, Value};
//!
//! let users = SchemaBuilder::new("u").add("id", DataType::Integer).build();
//! let orders = SchemaBuilder::new("o").add("user", DataType::Integer).build();
//!
//! let mut b = PlanBuilder::new();
//! let u = b.scan("u", users);
//! let o = b.scan("o", orders);
//! let on = JoinCondition::new(
//!     Attribute::new("u", "id", DataType::Integer),
//!     Attribute::new("o", "user", DataType::Integer),
//! );
//! let root = b.join(u, o, vec![on], JoinAlgorithm::SortMerge);
//! let plan = b.build(root).unwrap();
//!
//! let row = |v: i64| Tuple::from_values(vec![Value::integer(v)]);
//! let mut source = MemorySource::new(4096)
//!     .with_table("u", vec![row(1), row(2)])
//!     .with_table("o", vec![row(2), row(2), row(3)]);
//!
//! let config = ExecConfig::default();
//! let mut op = make_exec_plan(&plan, &config, &config, &mut source).unwrap();
//! assert_eq!(collect_tuples(op.as_mut()).unwrap().len(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Core types ([`Value`], [`Tuple`], [`Batch`], [`Schema`], [`Error`])
//! - [`storage`] - Engine configuration and spill files
//! - [`executor`] - Operators and the external sort
//! - [`optimizer`] - Plan tree, neighbor moves, search and compilation

pub mod core;
pub mod executor;
pub mod optimizer;
pub mod storage;

pub use core::{
    Attribute, Batch, DataType, Error, JoinCondition, Result, Schema, SchemaBuilder, Tuple, Value,
};

pub use executor::{
    collect_tuples, BlockNestedLoopJoin, Distinct, ExternalSort, MaterializedOperator, Operator,
    OrderBy, SortMergeJoin,
};

pub use storage::{BufferBudget, ExecConfig, UniformBudget};

pub use optimizer::{
    make_exec_plan, CostModel, JoinAlgorithm, Plan, PlanBuilder, RandomInitialPlan,
    RandomOptimizer, SearchConfig,
};
