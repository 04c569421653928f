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

//! Plan representation
//!
//! A plan is an arena of [`PlanNode`]s addressed by [`NodeId`], with one
//! root. Join nodes carry a *join index*: plans with `n` joins number them
//! `0..n`, each index used once. Transforms address joins by this index and
//! keep the set of indices intact.
//!
//! Plans are values. Every transform clones the plan and mutates the clone,
//! so a caller holding the original never sees it change. After any change
//! to the tree shape, [`Plan::repair_schemas`] recomputes every node's
//! schema bottom-up from the base relations.

use std::fmt;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::core::{Attribute, Error, JoinCondition, Result, Schema};

/// Position of a node in the plan arena
pub type NodeId = usize;

/// Join algorithm tag of a join node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinAlgorithm {
    /// Page nested-loop join: one-page outer blocks
    NestedLoop,
    /// Block nested-loop join: `B - 2` page outer blocks
    BlockNestedLoop,
    /// Sort-merge join over external sorts
    SortMerge,
    /// Reserved; no executor exists
    Hash,
}

impl JoinAlgorithm {
    /// Algorithms the executor can build
    pub const EXECUTABLE: [JoinAlgorithm; 3] = [
        JoinAlgorithm::NestedLoop,
        JoinAlgorithm::BlockNestedLoop,
        JoinAlgorithm::SortMerge,
    ];

    pub fn is_reserved(&self) -> bool {
        matches!(self, JoinAlgorithm::Hash)
    }
}

impl fmt::Display for JoinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinAlgorithm::NestedLoop => write!(f, "NestedLoop"),
            JoinAlgorithm::BlockNestedLoop => write!(f, "BlockNestedLoop"),
            JoinAlgorithm::SortMerge => write!(f, "SortMerge"),
            JoinAlgorithm::Hash => write!(f, "Hash"),
        }
    }
}

/// Operator variant of a plan node, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Scan,
    Select,
    Project,
    Join,
    Distinct,
    OrderBy,
    Sort,
}

/// A join between two subtrees
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: NodeId,
    pub right: NodeId,
    /// Equi-join conditions; `left` sides resolve in the left subtree
    pub conditions: Vec<JoinCondition>,
    pub algorithm: JoinAlgorithm,
    /// Stable number of this join within the plan
    pub join_index: usize,
}

/// Operator of a plan node
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOp {
    /// Base relation, executed by a caller-supplied scan
    Scan { table: String },
    /// Filter, executed by a caller-supplied operator
    Select { input: NodeId, predicate: String },
    /// Column restriction
    Project { input: NodeId, attributes: Vec<Attribute> },
    Join(JoinNode),
    /// Duplicate elimination on `attributes`
    Distinct { input: NodeId, attributes: Vec<Attribute> },
    /// Final ordering on `attributes`
    OrderBy { input: NodeId, attributes: Vec<Attribute> },
    /// Explicit external sort on `attributes`
    Sort { input: NodeId, attributes: Vec<Attribute> },
}

impl PlanOp {
    pub fn kind(&self) -> OperatorKind {
        match self {
            PlanOp::Scan { .. } => OperatorKind::Scan,
            PlanOp::Select { .. } => OperatorKind::Select,
            PlanOp::Project { .. } => OperatorKind::Project,
            PlanOp::Join(_) => OperatorKind::Join,
            PlanOp::Distinct { .. } => OperatorKind::Distinct,
            PlanOp::OrderBy { .. } => OperatorKind::OrderBy,
            PlanOp::Sort { .. } => OperatorKind::Sort,
        }
    }

    /// Child node ids, left before right
    pub fn children(&self) -> SmallVec<[NodeId; 2]> {
        let mut out = SmallVec::new();
        match self {
            PlanOp::Scan { .. } => {}
            PlanOp::Join(join) => {
                out.push(join.left);
                out.push(join.right);
            }
            PlanOp::Select { input, .. }
            | PlanOp::Project { input, .. }
            | PlanOp::Distinct { input, .. }
            | PlanOp::OrderBy { input, .. }
            | PlanOp::Sort { input, .. } => out.push(*input),
        }
        out
    }
}

/// A node of the plan arena: operator plus its output schema
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub op: PlanOp,
    pub schema: Schema,
}

/// A query plan tree stored as an arena
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    nodes: Vec<PlanNode>,
    root: NodeId,
}

impl Plan {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Output schema of the plan
    pub fn schema(&self) -> &Schema {
        &self.nodes[self.root].schema
    }

    pub fn node(&self, id: NodeId) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut PlanNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::InvalidPlan(format!("node {} out of range", id)))
    }

    fn node_ref(&self, id: NodeId) -> Result<&PlanNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::InvalidPlan(format!("node {} out of range", id)))
    }

    /// Schema of a node
    pub fn schema_of(&self, id: NodeId) -> Result<&Schema> {
        Ok(&self.node_ref(id)?.schema)
    }

    /// Join payload of a node, if it is a join
    pub fn join(&self, id: NodeId) -> Option<&JoinNode> {
        match self.nodes.get(id).map(|n| &n.op) {
            Some(PlanOp::Join(join)) => Some(join),
            _ => None,
        }
    }

    /// Returns true if the node is a join
    pub fn is_join(&self, id: NodeId) -> bool {
        self.join(id).is_some()
    }

    /// Reachable node ids, children before parents
    pub fn post_order(&self) -> Result<Vec<NodeId>> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = FxHashSet::default();
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !seen.insert(id) {
                return Err(Error::InvalidPlan(format!("node {} reached twice", id)));
            }
            let node = self.node_ref(id)?;
            stack.push((id, true));
            for child in node.op.children().into_iter().rev() {
                stack.push((child, false));
            }
        }
        Ok(order)
    }

    /// Number of reachable join nodes
    pub fn num_joins(&self) -> usize {
        self.post_order()
            .map(|order| order.into_iter().filter(|&id| self.is_join(id)).count())
            .unwrap_or(0)
    }

    /// Node id of the join numbered `join_index`
    pub fn find_join(&self, join_index: usize) -> Option<NodeId> {
        self.post_order().ok()?.into_iter().find(|&id| {
            self.join(id)
                .is_some_and(|join| join.join_index == join_index)
        })
    }

    /// Check the tree shape and the join numbering
    pub fn validate(&self) -> Result<()> {
        let order = self.post_order()?;
        let mut indices: Vec<usize> = order
            .iter()
            .filter_map(|&id| self.join(id).map(|j| j.join_index))
            .collect();
        indices.sort_unstable();
        for (expected, &index) in indices.iter().enumerate() {
            if index != expected {
                return Err(Error::InvalidPlan(format!(
                    "join indices must be 0..{} each used once, found {:?}",
                    indices.len(),
                    indices
                )));
            }
        }
        Ok(())
    }

    /// Recompute every reachable node's schema from its children
    ///
    /// Also checks that every join condition, projection and key resolves
    /// against the recomputed schemas.
    pub fn repair_schemas(&mut self) -> Result<()> {
        for id in self.post_order()? {
            let schema = self.derive_schema(id)?;
            self.node_mut(id)?.schema = schema;
        }
        Ok(())
    }

    fn derive_schema(&self, id: NodeId) -> Result<Schema> {
        let node = self.node_ref(id)?;
        match &node.op {
            PlanOp::Scan { .. } => Ok(node.schema.clone()),
            PlanOp::Select { input, .. } => Ok(self.schema_of(*input)?.clone()),
            PlanOp::Project { input, attributes } => self.schema_of(*input)?.sub_schema(attributes),
            PlanOp::Join(join) => {
                let left = self.schema_of(join.left)?;
                let right = self.schema_of(join.right)?;
                for cond in &join.conditions {
                    left.position(&cond.left)?;
                    right.position(&cond.right)?;
                }
                Ok(left.join_with(right))
            }
            PlanOp::Distinct { input, attributes }
            | PlanOp::OrderBy { input, attributes }
            | PlanOp::Sort { input, attributes } => {
                let schema = self.schema_of(*input)?;
                schema.positions(attributes)?;
                Ok(schema.clone())
            }
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let Some(node) = self.nodes.get(id) else {
            return writeln!(f, "{:indent$}<missing {}>", "", id, indent = depth * 2);
        };
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        match &node.op {
            PlanOp::Scan { table } => writeln!(f, "Scan {}", table)?,
            PlanOp::Select { predicate, .. } => writeln!(f, "Select ({})", predicate)?,
            PlanOp::Project { attributes, .. } => writeln!(f, "Project {}", list(attributes))?,
            PlanOp::Join(join) => {
                let conds: Vec<String> = join.conditions.iter().map(|c| c.to_string()).collect();
                writeln!(
                    f,
                    "Join#{} [{}] ({})",
                    join.join_index,
                    join.algorithm,
                    conds.join(" AND ")
                )?
            }
            PlanOp::Distinct { attributes, .. } => writeln!(f, "Distinct {}", list(attributes))?,
            PlanOp::OrderBy { attributes, .. } => writeln!(f, "OrderBy {}", list(attributes))?,
            PlanOp::Sort { attributes, .. } => writeln!(f, "Sort {}", list(attributes))?,
        }
        for child in node.op.children() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

fn list(attributes: &[Attribute]) -> String {
    let names: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
    format!("[{}]", names.join(", "))
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, 0)
    }
}

/// Incremental construction of a plan
///
/// Joins are numbered in the order they are added.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    nodes: Vec<PlanNode>,
    next_join: usize,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, op: PlanOp, schema: Schema) -> NodeId {
        self.nodes.push(PlanNode { op, schema });
        self.nodes.len() - 1
    }

    /// Base relation with its catalog schema
    pub fn scan(&mut self, table: impl Into<String>, schema: Schema) -> NodeId {
        self.push(PlanOp::Scan { table: table.into() }, schema)
    }

    pub fn select(&mut self, input: NodeId, predicate: impl Into<String>) -> NodeId {
        let predicate = predicate.into();
        self.push(PlanOp::Select { input, predicate }, Schema::default())
    }

    pub fn project(&mut self, input: NodeId, attributes: Vec<Attribute>) -> NodeId {
        self.push(PlanOp::Project { input, attributes }, Schema::default())
    }

    /// Join two subtrees; the join gets the next free join index
    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        conditions: Vec<JoinCondition>,
        algorithm: JoinAlgorithm,
    ) -> NodeId {
        let join_index = self.next_join;
        self.next_join += 1;
        let join = JoinNode {
            left,
            right,
            conditions,
            algorithm,
            join_index,
        };
        self.push(PlanOp::Join(join), Schema::default())
    }

    pub fn distinct(&mut self, input: NodeId, attributes: Vec<Attribute>) -> NodeId {
        self.push(PlanOp::Distinct { input, attributes }, Schema::default())
    }

    pub fn order_by(&mut self, input: NodeId, attributes: Vec<Attribute>) -> NodeId {
        self.push(PlanOp::OrderBy { input, attributes }, Schema::default())
    }

    pub fn sort(&mut self, input: NodeId, attributes: Vec<Attribute>) -> NodeId {
        self.push(PlanOp::Sort { input, attributes }, Schema::default())
    }

    /// Finish the plan at `root`, validating it and computing every schema
    pub fn build(self, root: NodeId) -> Result<Plan> {
        let mut plan = Plan {
            nodes: self.nodes,
            root,
        };
        plan.validate()?;
        plan.repair_schemas()?;
        Ok(plan)
    }
}
