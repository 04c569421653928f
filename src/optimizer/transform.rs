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

//! Neighbor moves of the randomized search
//!
//! Three moves turn a plan into a neighbor. Each picks a join by its index:
//!
//! - **Method change**: give the join a different algorithm tag.
//! - **Commutativity**: swap the join's children and flip its conditions.
//! - **Associativity**: rotate the join with a join child.
//!
//! ## Rotations
//!
//! For `op = (A ⋈ B) ⋈ C` (left child is a join), the side of `op`'s
//! condition that refers to the left subtree decides the result:
//!
//! ```text
//! in B:  (A ⋈₁ B) ⋈₂ C  →  A ⋈₁ (B ⋈₂ C)
//! in A:  (A ⋈₁ B) ⋈₂ C  →  B ⋈₁' (A ⋈₂ C)      ⋈₁' = flipped ⋈₁
//! ```
//!
//! For `op = A ⋈ (B ⋈ C)` (right child is a join), the side referring to
//! the right subtree decides:
//!
//! ```text
//! in B:  A ⋈₂ (B ⋈₁ C)  →  (A ⋈₂ B) ⋈₁ C
//! in C:  A ⋈₂ (B ⋈₁ C)  →  (A ⋈₂ C) ⋈₁' B      ⋈₁' = flipped ⋈₁
//! ```
//!
//! Each join keeps its own conditions, algorithm and index, so the set of
//! join indices in the plan never changes. The outer node keeps its arena
//! slot and the inner node reuses the child's slot. When both children are
//! joins a coin flip picks the rotation; when neither is, or the condition
//! spans both grandchildren, the move leaves the plan unchanged.
//!
//! All moves work on a clone and repair its schemas before returning it.

use rand::Rng;

use super::plan::{JoinAlgorithm, JoinNode, NodeId, Plan, PlanOp};
use crate::core::{Attribute, Error, JoinCondition, Result, Schema};

/// The kind of a neighbor move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    MethodChange,
    Commutativity,
    Associativity,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::MethodChange, Move::Commutativity, Move::Associativity];
}

fn join_slot(plan: &Plan, join_index: usize) -> Result<NodeId> {
    plan.find_join(join_index)
        .ok_or_else(|| Error::InvalidPlan(format!("no join numbered {}", join_index)))
}

fn join_at(plan: &Plan, id: NodeId) -> Result<JoinNode> {
    plan.join(id)
        .cloned()
        .ok_or_else(|| Error::InvalidPlan(format!("node {} is not a join", id)))
}

fn set_join(plan: &mut Plan, id: NodeId, join: JoinNode) -> Result<()> {
    plan.node_mut(id)?.op = PlanOp::Join(join);
    Ok(())
}

fn flip_all(conditions: &[JoinCondition]) -> Vec<JoinCondition> {
    conditions.iter().map(JoinCondition::flipped).collect()
}

fn all_in<'a>(schema: &Schema, mut attrs: impl Iterator<Item = &'a Attribute>) -> bool {
    attrs.all(|a| schema.contains(a))
}

/// Give join `join_index` an algorithm from `algorithms` other than its
/// current one, uniformly at random
pub fn change_method<R: Rng>(
    plan: &Plan,
    join_index: usize,
    algorithms: &[JoinAlgorithm],
    rng: &mut R,
) -> Result<Plan> {
    let mut next = plan.clone();
    let id = join_slot(&next, join_index)?;
    let mut join = join_at(&next, id)?;
    let choices: Vec<JoinAlgorithm> = algorithms
        .iter()
        .copied()
        .filter(|&a| a != join.algorithm)
        .collect();
    if choices.is_empty() {
        return Ok(next);
    }
    join.algorithm = choices[rng.random_range(0..choices.len())];
    set_join(&mut next, id, join)?;
    next.repair_schemas()?;
    Ok(next)
}

/// Swap the children of join `join_index`
pub fn commute(plan: &Plan, join_index: usize) -> Result<Plan> {
    let mut next = plan.clone();
    let id = join_slot(&next, join_index)?;
    let mut join = join_at(&next, id)?;
    std::mem::swap(&mut join.left, &mut join.right);
    join.conditions = flip_all(&join.conditions);
    set_join(&mut next, id, join)?;
    next.repair_schemas()?;
    Ok(next)
}

/// Re-associate join `join_index` with one of its join children
pub fn associate<R: Rng>(plan: &Plan, join_index: usize, rng: &mut R) -> Result<Plan> {
    let mut next = plan.clone();
    let id = join_slot(&next, join_index)?;
    let op = join_at(&next, id)?;
    let rotated = match (next.is_join(op.left), next.is_join(op.right)) {
        (true, false) => rotate_left_child(&mut next, id, op)?,
        (false, true) => rotate_right_child(&mut next, id, op)?,
        (true, true) => {
            if rng.random_bool(0.5) {
                rotate_left_child(&mut next, id, op)?
            } else {
                rotate_right_child(&mut next, id, op)?
            }
        }
        (false, false) => false,
    };
    if rotated {
        next.repair_schemas()?;
    }
    Ok(next)
}

/// `(A ⋈ B) ⋈ C` at slot `id`; returns false if no rotation applies
fn rotate_left_child(plan: &mut Plan, id: NodeId, op: JoinNode) -> Result<bool> {
    let child_id = op.left;
    let child = join_at(plan, child_id)?;
    let (a, b, c) = (child.left, child.right, op.right);
    let lhs = || op.conditions.iter().map(|cond| &cond.left);

    let (inner, outer) = if all_in(plan.schema_of(b)?, lhs()) {
        // A ⋈ (B ⋈ C)
        let inner = JoinNode {
            left: b,
            right: c,
            ..op.clone()
        };
        let outer = JoinNode {
            left: a,
            right: child_id,
            ..child
        };
        (inner, outer)
    } else if all_in(plan.schema_of(a)?, lhs()) {
        // B ⋈ (A ⋈ C)
        let inner = JoinNode {
            left: a,
            right: c,
            ..op.clone()
        };
        let outer = JoinNode {
            left: b,
            right: child_id,
            conditions: flip_all(&child.conditions),
            ..child
        };
        (inner, outer)
    } else {
        return Ok(false);
    };
    set_join(plan, child_id, inner)?;
    set_join(plan, id, outer)?;
    Ok(true)
}

/// `A ⋈ (B ⋈ C)` at slot `id`; returns false if no rotation applies
fn rotate_right_child(plan: &mut Plan, id: NodeId, op: JoinNode) -> Result<bool> {
    let child_id = op.right;
    let child = join_at(plan, child_id)?;
    let (a, b, c) = (op.left, child.left, child.right);
    let rhs = || op.conditions.iter().map(|cond| &cond.right);

    let (inner, outer) = if all_in(plan.schema_of(b)?, rhs()) {
        // (A ⋈ B) ⋈ C
        let inner = JoinNode {
            left: a,
            right: b,
            ..op.clone()
        };
        let outer = JoinNode {
            left: child_id,
            right: c,
            ..child
        };
        (inner, outer)
    } else if all_in(plan.schema_of(c)?, rhs()) {
        // (A ⋈ C) ⋈ B
        let inner = JoinNode {
            left: a,
            right: c,
            ..op.clone()
        };
        let outer = JoinNode {
            left: child_id,
            right: b,
            conditions: flip_all(&child.conditions),
            ..child
        };
        (inner, outer)
    } else {
        return Ok(false);
    };
    set_join(plan, child_id, inner)?;
    set_join(plan, id, outer)?;
    Ok(true)
}

/// Apply one specific move to join `join_index`
pub fn apply_move<R: Rng>(
    plan: &Plan,
    join_index: usize,
    mv: Move,
    algorithms: &[JoinAlgorithm],
    rng: &mut R,
) -> Result<Plan> {
    match mv {
        Move::MethodChange => change_method(plan, join_index, algorithms, rng),
        Move::Commutativity => commute(plan, join_index),
        Move::Associativity => associate(plan, join_index, rng),
    }
}

/// A random neighbor: uniform join, uniform move
///
/// A plan without joins is its own only neighbor.
pub fn random_neighbor<R: Rng>(
    plan: &Plan,
    algorithms: &[JoinAlgorithm],
    rng: &mut R,
) -> Result<Plan> {
    let num_joins = plan.num_joins();
    if num_joins == 0 {
        return Ok(plan.clone());
    }
    let join_index = rng.random_range(0..num_joins);
    let mv = Move::ALL[rng.random_range(0..Move::ALL.len())];
    apply_move(plan, join_index, mv, algorithms, rng)
}
