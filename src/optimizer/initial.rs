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

//! Random initial plans
//!
//! Iterative improvement restarts from a fresh random plan each time. The
//! optimizer asks an [`InitialPlanSource`] for these; [`RandomInitialPlan`]
//! is the stock source that grows a random connected join tree over a
//! [`JoinGraph`].

use rand::Rng;
use rustc_hash::FxHashSet;

use super::plan::{JoinAlgorithm, NodeId, Plan, PlanBuilder};
use crate::core::{Attribute, Error, JoinCondition, Result, Schema};

/// Producer of starting points for the search
pub trait InitialPlanSource {
    fn initial_plan<R: Rng>(&self, rng: &mut R) -> Result<Plan>;
}

impl InitialPlanSource for Plan {
    /// A fixed plan is its own only starting point
    fn initial_plan<R: Rng>(&self, _rng: &mut R) -> Result<Plan> {
        Ok(self.clone())
    }
}

/// Base relations and the equi-join conditions between them
#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    relations: Vec<(String, Schema)>,
    conditions: Vec<JoinCondition>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, table: impl Into<String>, schema: Schema) -> Self {
        self.relations.push((table.into(), schema));
        self
    }

    pub fn condition(mut self, condition: JoinCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn relations(&self) -> &[(String, Schema)] {
        &self.relations
    }

    pub fn conditions(&self) -> &[JoinCondition] {
        &self.conditions
    }

    fn table_of(&self, attr: &Attribute) -> Result<usize> {
        self.relations
            .iter()
            .position(|(_, schema)| schema.contains(attr))
            .ok_or_else(|| Error::attribute_not_found(attr.to_string()))
    }
}

/// Random connected join tree over a [`JoinGraph`]
///
/// Starting from a random relation, each step joins a random relation that
/// shares a condition with the tree built so far, on a random side, with a
/// random algorithm. Optional projection, duplicate elimination and ordering
/// wrap the join tree.
#[derive(Debug, Clone)]
pub struct RandomInitialPlan {
    graph: JoinGraph,
    algorithms: Vec<JoinAlgorithm>,
    projection: Option<Vec<Attribute>>,
    distinct: Option<Vec<Attribute>>,
    order_by: Option<Vec<Attribute>>,
}

impl RandomInitialPlan {
    pub fn new(graph: JoinGraph) -> Self {
        Self {
            graph,
            algorithms: JoinAlgorithm::EXECUTABLE.to_vec(),
            projection: None,
            distinct: None,
            order_by: None,
        }
    }

    /// Algorithms to draw join tags from
    pub fn with_algorithms(mut self, algorithms: &[JoinAlgorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    pub fn with_projection(mut self, attributes: Vec<Attribute>) -> Self {
        self.projection = Some(attributes);
        self
    }

    pub fn with_distinct(mut self, attributes: Vec<Attribute>) -> Self {
        self.distinct = Some(attributes);
        self
    }

    pub fn with_order_by(mut self, attributes: Vec<Attribute>) -> Self {
        self.order_by = Some(attributes);
        self
    }

    pub fn graph(&self) -> &JoinGraph {
        &self.graph
    }

    fn pick_algorithm<R: Rng>(&self, rng: &mut R) -> Result<JoinAlgorithm> {
        if self.algorithms.is_empty() {
            return Err(Error::InvalidConfig("no join algorithms to choose from".into()));
        }
        Ok(self.algorithms[rng.random_range(0..self.algorithms.len())])
    }
}

impl InitialPlanSource for RandomInitialPlan {
    fn initial_plan<R: Rng>(&self, rng: &mut R) -> Result<Plan> {
        let relations = self.graph.relations();
        if relations.is_empty() {
            return Err(Error::InvalidPlan("join graph has no relations".into()));
        }

        // Resolve each condition to the pair of relations it connects
        let mut edges = Vec::with_capacity(self.graph.conditions().len());
        for cond in self.graph.conditions() {
            let l = self.graph.table_of(&cond.left)?;
            let r = self.graph.table_of(&cond.right)?;
            edges.push((l, r, cond));
        }

        let mut b = PlanBuilder::new();
        let scans: Vec<NodeId> = relations
            .iter()
            .map(|(table, schema)| b.scan(table.clone(), schema.clone()))
            .collect();

        let first = rng.random_range(0..relations.len());
        let mut joined = FxHashSet::default();
        joined.insert(first);
        let mut tree = scans[first];

        while joined.len() < relations.len() {
            let mut frontier: Vec<usize> = edges
                .iter()
                .filter_map(|&(l, r, _)| match (joined.contains(&l), joined.contains(&r)) {
                    (true, false) => Some(r),
                    (false, true) => Some(l),
                    _ => None,
                })
                .collect();
            frontier.sort_unstable();
            frontier.dedup();
            if frontier.is_empty() {
                let missing: Vec<&str> = (0..relations.len())
                    .filter(|i| !joined.contains(i))
                    .map(|i| relations[i].0.as_str())
                    .collect();
                return Err(Error::InvalidPlan(format!(
                    "join graph is disconnected; cannot reach {}",
                    missing.join(", ")
                )));
            }
            let next = frontier[rng.random_range(0..frontier.len())];

            // Every condition between the tree and `next`, tree side first
            let conditions: Vec<JoinCondition> = edges
                .iter()
                .filter_map(|&(l, r, cond)| {
                    if joined.contains(&l) && r == next {
                        Some(cond.clone())
                    } else if l == next && joined.contains(&r) {
                        Some(cond.flipped())
                    } else {
                        None
                    }
                })
                .collect();

            let algorithm = self.pick_algorithm(rng)?;
            tree = if rng.random_bool(0.5) {
                b.join(tree, scans[next], conditions, algorithm)
            } else {
                let flipped = conditions.iter().map(JoinCondition::flipped).collect();
                b.join(scans[next], tree, flipped, algorithm)
            };
            joined.insert(next);
        }

        if let Some(attrs) = &self.projection {
            tree = b.project(tree, attrs.clone());
        }
        if let Some(attrs) = &self.distinct {
            tree = b.distinct(tree, attrs.clone());
        }
        if let Some(attrs) = &self.order_by {
            tree = b.order_by(tree, attrs.clone());
        }
        b.build(tree)
    }
}
