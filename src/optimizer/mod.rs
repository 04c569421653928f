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

//! Join-order optimizer
//!
//! This module searches for a cheap equivalent of a join tree by random
//! local moves, and compiles the chosen tree into executable operators.
//!
//! ## Modules
//!
//! - `plan` - Arena plan tree with stable join indices
//! - `transform` - Method-change, commutativity and associativity moves
//! - `cost` - The opaque cost model seam
//! - `initial` - Random starting plans over a join graph
//! - `random` - Iterative improvement and simulated annealing
//! - `compile` - Plan to operator tree

pub mod compile;
pub mod cost;
pub mod initial;
pub mod plan;
pub mod random;
pub mod transform;

pub use compile::{make_exec_plan, MemorySource, SourceProvider};
pub use cost::CostModel;
pub use initial::{InitialPlanSource, JoinGraph, RandomInitialPlan};
pub use plan::{JoinAlgorithm, JoinNode, NodeId, OperatorKind, Plan, PlanBuilder, PlanNode, PlanOp};
pub use random::{RandomOptimizer, SearchConfig, SearchOutcome, SearchStats};
pub use transform::{apply_move, associate, change_method, commute, random_neighbor, Move};
