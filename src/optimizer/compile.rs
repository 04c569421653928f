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

//! Plan compilation
//!
//! [`make_exec_plan`] turns an optimized [`Plan`] into a tree of executable
//! operators. Joins become block nested-loop, page nested-loop or sort-merge
//! joins according to their algorithm tag; distinct, order-by and sort
//! nodes become their external-sort based operators. Base relations and the
//! simple filter and projection operators come from a [`SourceProvider`].

use rustc_hash::FxHashMap;
use tracing::debug;

use super::plan::{JoinAlgorithm, NodeId, Plan, PlanOp};
use crate::core::{Attribute, Error, Result, Schema, Tuple};
use crate::executor::{
    BlockNestedLoopJoin, Distinct, ExternalSort, MaterializedOperator, Operator, OrderBy,
    SortMergeJoin,
};
use crate::storage::{BufferBudget, ExecConfig};

/// Supplier of the leaf and pass-through operators of a plan
pub trait SourceProvider {
    /// Operator reading base relation `table` with the given layout
    fn scan(&mut self, table: &str, schema: &Schema) -> Result<Box<dyn Operator>>;

    /// Operator filtering `input` by `predicate`
    fn select(&mut self, input: Box<dyn Operator>, predicate: &str) -> Result<Box<dyn Operator>> {
        let _ = input;
        Err(Error::UnsupportedAlgorithm(format!("select ({})", predicate)))
    }

    /// Operator restricting `input` to `attributes`
    fn project(
        &mut self,
        input: Box<dyn Operator>,
        attributes: &[Attribute],
    ) -> Result<Box<dyn Operator>> {
        let _ = (input, attributes);
        Err(Error::UnsupportedAlgorithm("project".into()))
    }
}

/// Base relations held in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    tables: FxHashMap<String, Vec<Tuple>>,
    page_size: usize,
}

impl MemorySource {
    /// Source whose scans produce pages of `page_size` bytes
    pub fn new(page_size: usize) -> Self {
        Self {
            tables: FxHashMap::default(),
            page_size,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>, tuples: Vec<Tuple>) -> Self {
        self.insert(table, tuples);
        self
    }

    pub fn insert(&mut self, table: impl Into<String>, tuples: Vec<Tuple>) {
        self.tables.insert(table.into(), tuples);
    }
}

impl SourceProvider for MemorySource {
    fn scan(&mut self, table: &str, schema: &Schema) -> Result<Box<dyn Operator>> {
        let tuples = self
            .tables
            .get(table)
            .ok_or_else(|| Error::InvalidPlan(format!("no data for table '{}'", table)))?;
        Ok(Box::new(MaterializedOperator::new(
            tuples.clone(),
            schema.clone(),
            self.page_size,
        )))
    }
}

/// Build the executable operator tree for `plan`
///
/// Joins get `budget.buffers_per_join()` pages each; distinct, order-by and
/// sort nodes get `budget.num_buffers()`. Nothing is opened.
pub fn make_exec_plan(
    plan: &Plan,
    config: &ExecConfig,
    budget: &dyn BufferBudget,
    sources: &mut dyn SourceProvider,
) -> Result<Box<dyn Operator>> {
    config.validate()?;
    plan.validate()?;
    build(plan, plan.root(), config, budget, sources)
}

fn build(
    plan: &Plan,
    id: NodeId,
    config: &ExecConfig,
    budget: &dyn BufferBudget,
    sources: &mut dyn SourceProvider,
) -> Result<Box<dyn Operator>> {
    let node = plan
        .node(id)
        .ok_or_else(|| Error::InvalidPlan(format!("node {} out of range", id)))?;

    let op: Box<dyn Operator> = match &node.op {
        PlanOp::Scan { table } => sources.scan(table, &node.schema)?,
        PlanOp::Select { input, predicate } => {
            let input = build(plan, *input, config, budget, sources)?;
            sources.select(input, predicate)?
        }
        PlanOp::Project { input, attributes } => {
            let input = build(plan, *input, config, budget, sources)?;
            sources.project(input, attributes)?
        }
        PlanOp::Join(join) => {
            if join.algorithm.is_reserved() {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "{} join (join #{})",
                    join.algorithm, join.join_index
                )));
            }
            let left = build(plan, join.left, config, budget, sources)?;
            let right = build(plan, join.right, config, budget, sources)?;
            let pages = budget.buffers_per_join();
            debug!(
                join_index = join.join_index,
                algorithm = %join.algorithm,
                pages,
                "compiling join"
            );
            match join.algorithm {
                JoinAlgorithm::NestedLoop => Box::new(BlockNestedLoopJoin::page_nested(
                    left,
                    right,
                    &join.conditions,
                    pages,
                    config,
                )?),
                JoinAlgorithm::BlockNestedLoop => Box::new(BlockNestedLoopJoin::new(
                    left,
                    right,
                    &join.conditions,
                    pages,
                    config,
                )?),
                JoinAlgorithm::SortMerge => Box::new(SortMergeJoin::new(
                    left,
                    right,
                    &join.conditions,
                    pages,
                    config,
                )?),
                JoinAlgorithm::Hash => {
                    return Err(Error::UnsupportedAlgorithm("hash join".into()));
                }
            }
        }
        PlanOp::Distinct { input, attributes } => {
            let input = build(plan, *input, config, budget, sources)?;
            Box::new(Distinct::new(input, attributes, budget.num_buffers(), config)?)
        }
        PlanOp::OrderBy { input, attributes } => {
            let input = build(plan, *input, config, budget, sources)?;
            Box::new(OrderBy::new(input, attributes, budget.num_buffers(), config)?)
        }
        PlanOp::Sort { input, attributes } => {
            let input = build(plan, *input, config, budget, sources)?;
            Box::new(ExternalSort::new(input, attributes, budget.num_buffers(), config)?)
        }
    };

    if op.schema() != &node.schema {
        return Err(Error::InvalidPlan(format!(
            "{} produces {} but the plan expects {}",
            op.name(),
            op.schema(),
            node.schema
        )));
    }
    Ok(op)
}
