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

//! Cost model seam
//!
//! The optimizer treats cost as an opaque function from a plan to a number
//! and only ever compares the results. Estimation formulas live with the
//! caller; anything implementing [`CostModel`] plugs in, including a plain
//! closure.

use super::plan::Plan;
use crate::core::{Error, Result};

/// Estimated cost of executing a plan
///
/// Lower is better. Implementations return [`Error::CostEvaluation`] for
/// plans they cannot price; the optimizer discards such a plan and samples
/// another.
pub trait CostModel {
    fn cost(&self, plan: &Plan) -> Result<f64>;
}

impl<F> CostModel for F
where
    F: Fn(&Plan) -> Result<f64>,
{
    fn cost(&self, plan: &Plan) -> Result<f64> {
        self(plan)
    }
}

/// Cost a plan, rejecting NaN and infinite values
pub(crate) fn evaluate<C: CostModel + ?Sized>(model: &C, plan: &Plan) -> Result<f64> {
    let cost = model.cost(plan)?;
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(Error::CostEvaluation(format!("cost model returned {}", cost)))
    }
}
