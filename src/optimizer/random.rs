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

//! Randomized plan search
//!
//! Two-phase optimization over equivalent join trees:
//!
//! 1. **Iterative improvement**: from each of several random starting
//!    plans, sample `neighbors_per_join × numJoin` neighbors, move to the
//!    cheapest if it beats the current plan, and stop at the first step
//!    that does not. The best local optimum over all restarts wins.
//! 2. **Simulated annealing**, seeded with that winner: a random walk that
//!    always takes non-worsening moves and takes a worsening move of `Δ`
//!    with probability `exp(-Δ/T)`. `T` starts at `temperature_factor`
//!    times the seed cost and shrinks by `cooling_rate` every round. The
//!    walk ends once `T` is below `temperature_floor` and the best plan
//!    has not changed for `stable_rounds` rounds.
//!
//! The best plan seen is tracked throughout, so neither phase returns a
//! plan more expensive than its starting point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::cost::{evaluate, CostModel};
use super::initial::InitialPlanSource;
use super::plan::{JoinAlgorithm, Plan};
use super::transform::random_neighbor;
use crate::core::{Error, Result};

/// Tuning knobs of the search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Random restarts of iterative improvement
    /// Default: 10
    pub restarts: usize,

    /// Neighbors sampled per join at each descent step
    /// Default: 2
    pub neighbors_per_join: usize,

    /// Starting temperature as a fraction of the seed cost
    /// Default: 0.1
    pub temperature_factor: f64,

    /// Temperature multiplier applied after each round
    /// Default: 0.95
    pub cooling_rate: f64,

    /// Steps per annealing round, per join
    /// Default: 16
    pub equilibrium_factor: usize,

    /// Temperature below which annealing may stop
    /// Default: 1.0
    pub temperature_floor: f64,

    /// Rounds without a new best plan required to stop
    /// Default: 4
    pub stable_rounds: usize,

    /// Tries to obtain one usable neighbor before giving up on the step
    /// Default: 32
    pub max_neighbor_attempts: usize,

    /// Hard cap on annealing rounds
    /// Default: 100_000
    pub max_rounds: usize,

    /// Algorithms a method change may pick
    pub algorithms: Vec<JoinAlgorithm>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            restarts: 10,
            neighbors_per_join: 2,
            temperature_factor: 0.1,
            cooling_rate: 0.95,
            equilibrium_factor: 16,
            temperature_floor: 1.0,
            stable_rounds: 4,
            max_neighbor_attempts: 32,
            max_rounds: 100_000,
            algorithms: JoinAlgorithm::EXECUTABLE.to_vec(),
        }
    }
}

impl SearchConfig {
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_neighbors_per_join(mut self, neighbors: usize) -> Self {
        self.neighbors_per_join = neighbors;
        self
    }

    pub fn with_temperature_factor(mut self, factor: f64) -> Self {
        self.temperature_factor = factor;
        self
    }

    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    pub fn with_equilibrium_factor(mut self, factor: usize) -> Self {
        self.equilibrium_factor = factor;
        self
    }

    pub fn with_temperature_floor(mut self, floor: f64) -> Self {
        self.temperature_floor = floor;
        self
    }

    pub fn with_stable_rounds(mut self, rounds: usize) -> Self {
        self.stable_rounds = rounds;
        self
    }

    pub fn with_max_neighbor_attempts(mut self, attempts: usize) -> Self {
        self.max_neighbor_attempts = attempts;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_algorithms(mut self, algorithms: &[JoinAlgorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    /// Reject settings the search cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.restarts == 0 {
            return Err(Error::InvalidConfig("restarts must be at least 1".into()));
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "cooling_rate must be in (0, 1), got {}",
                self.cooling_rate
            )));
        }
        if !self.temperature_factor.is_finite() || self.temperature_factor < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "temperature_factor must be a non-negative number, got {}",
                self.temperature_factor
            )));
        }
        if !self.temperature_floor.is_finite() {
            return Err(Error::InvalidConfig("temperature_floor must be finite".into()));
        }
        if self.neighbors_per_join == 0
            || self.equilibrium_factor == 0
            || self.max_neighbor_attempts == 0
        {
            return Err(Error::InvalidConfig(
                "neighbor counts and attempts must be at least 1".into(),
            ));
        }
        if let Some(reserved) = self.algorithms.iter().find(|a| a.is_reserved()) {
            return Err(Error::InvalidConfig(format!(
                "{} join has no executor and cannot be searched",
                reserved
            )));
        }
        Ok(())
    }
}

/// Counters collected during a search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Cost of each restart's starting plan
    pub initial_costs: Vec<f64>,
    /// Cost of each restart's local optimum
    pub local_optima: Vec<f64>,
    /// Descent steps that moved to a cheaper neighbor
    pub improving_moves: usize,
    /// Annealing rounds run
    pub rounds: usize,
    /// Annealing moves taken
    pub accepted: usize,
    /// Annealing moves refused
    pub rejected: usize,
    /// Neighbors dropped after a transient error
    pub discarded: usize,
}

/// Result of a search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub plan: Plan,
    pub cost: f64,
    pub stats: SearchStats,
}

/// Neighbor-construction failures that only invalidate the candidate
fn is_discardable(err: &Error) -> bool {
    err.is_transient() || matches!(err, Error::InvalidPlan(_) | Error::AttributeNotFound(_))
}

/// Randomized join-order optimizer
pub struct RandomOptimizer<R: Rng = StdRng> {
    config: SearchConfig,
    rng: R,
}

impl RandomOptimizer<StdRng> {
    /// Optimizer seeded from the thread-local generator
    pub fn new(config: SearchConfig) -> Self {
        Self::from_seed(config, rand::rng().random())
    }

    /// Reproducible optimizer
    pub fn from_seed(config: SearchConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomOptimizer<R> {
    pub fn with_rng(config: SearchConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Iterative improvement followed by simulated annealing
    pub fn optimize<S, C>(&mut self, source: &S, cost: &C) -> Result<SearchOutcome>
    where
        S: InitialPlanSource,
        C: CostModel + ?Sized,
    {
        self.config.validate()?;
        let mut stats = SearchStats::default();
        let (seed, seed_cost) = self.descend(source, cost, &mut stats)?;
        let (plan, cost) = self.anneal(seed, seed_cost, cost, &mut stats)?;
        Ok(SearchOutcome { plan, cost, stats })
    }

    /// Best local optimum over `restarts` random starting plans
    pub fn iterative_improvement<S, C>(&mut self, source: &S, cost: &C) -> Result<SearchOutcome>
    where
        S: InitialPlanSource,
        C: CostModel + ?Sized,
    {
        self.config.validate()?;
        let mut stats = SearchStats::default();
        let (plan, cost) = self.descend(source, cost, &mut stats)?;
        Ok(SearchOutcome { plan, cost, stats })
    }

    /// Anneal from `seed`; the result is never worse than the seed
    pub fn simulated_annealing<C>(&mut self, seed: Plan, cost: &C) -> Result<SearchOutcome>
    where
        C: CostModel + ?Sized,
    {
        self.config.validate()?;
        let mut seed = seed;
        seed.repair_schemas()?;
        let seed_cost = evaluate(cost, &seed)?;
        let mut stats = SearchStats::default();
        let (plan, cost) = self.anneal(seed, seed_cost, cost, &mut stats)?;
        Ok(SearchOutcome { plan, cost, stats })
    }

    /// One usable neighbor of `plan` with its cost
    ///
    /// Returns `None` when every attempt hit a transient error.
    fn sample_neighbor<C>(
        &mut self,
        plan: &Plan,
        cost: &C,
        stats: &mut SearchStats,
    ) -> Result<Option<(Plan, f64)>>
    where
        C: CostModel + ?Sized,
    {
        for _ in 0..self.config.max_neighbor_attempts {
            let candidate = match random_neighbor(plan, &self.config.algorithms, &mut self.rng) {
                Ok(candidate) => candidate,
                Err(err) if is_discardable(&err) => {
                    stats.discarded += 1;
                    debug!(error = %err, "discarding neighbor");
                    continue;
                }
                Err(err) => return Err(err),
            };
            match evaluate(cost, &candidate) {
                Ok(c) => return Ok(Some((candidate, c))),
                Err(err) if err.is_transient() => {
                    stats.discarded += 1;
                    debug!(error = %err, "discarding neighbor");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn descend<S, C>(
        &mut self,
        source: &S,
        cost: &C,
        stats: &mut SearchStats,
    ) -> Result<(Plan, f64)>
    where
        S: InitialPlanSource,
        C: CostModel + ?Sized,
    {
        let mut best: Option<(Plan, f64)> = None;
        for restart in 0..self.config.restarts {
            let mut plan = source.initial_plan(&mut self.rng)?;
            plan.repair_schemas()?;
            let mut current = evaluate(cost, &plan)?;
            stats.initial_costs.push(current);

            let samples = self.config.neighbors_per_join * plan.num_joins();
            loop {
                let mut step: Option<(Plan, f64)> = None;
                for _ in 0..samples {
                    if let Some((candidate, c)) = self.sample_neighbor(&plan, cost, stats)? {
                        if step.as_ref().map_or(true, |(_, s)| c < *s) {
                            step = Some((candidate, c));
                        }
                    }
                }
                match step {
                    Some((candidate, c)) if c < current => {
                        plan = candidate;
                        current = c;
                        stats.improving_moves += 1;
                    }
                    _ => break,
                }
            }

            debug!(restart, cost = current, "local optimum");
            stats.local_optima.push(current);
            if best.as_ref().map_or(true, |(_, b)| current < *b) {
                best = Some((plan, current));
            }
        }

        let Some((plan, cost)) = best else {
            return Err(Error::InvalidConfig("restarts must be at least 1".into()));
        };
        info!(
            restarts = self.config.restarts,
            cost,
            improving_moves = stats.improving_moves,
            "iterative improvement finished"
        );
        Ok((plan, cost))
    }

    fn anneal<C>(
        &mut self,
        seed: Plan,
        seed_cost: f64,
        cost: &C,
        stats: &mut SearchStats,
    ) -> Result<(Plan, f64)>
    where
        C: CostModel + ?Sized,
    {
        let num_joins = seed.num_joins();
        if num_joins == 0 {
            return Ok((seed, seed_cost));
        }

        let mut best = (seed.clone(), seed_cost);
        let mut current = seed;
        let mut current_cost = seed_cost;
        let mut temperature = self.config.temperature_factor * seed_cost;
        let mut stable = 0;
        let mut rounds = 0;
        let steps = self.config.equilibrium_factor * num_joins;

        loop {
            if temperature < self.config.temperature_floor && stable >= self.config.stable_rounds {
                break;
            }
            if rounds >= self.config.max_rounds {
                warn!(rounds, temperature, "annealing stopped at the round limit");
                break;
            }

            let mut improved = false;
            for _ in 0..steps {
                let Some((candidate, c)) = self.sample_neighbor(&current, cost, stats)? else {
                    continue;
                };
                let delta = c - current_cost;
                let accept = delta <= 0.0
                    || (temperature > 0.0
                        && self.rng.random::<f64>() < (-delta / temperature).exp());
                if !accept {
                    stats.rejected += 1;
                    continue;
                }
                stats.accepted += 1;
                current = candidate;
                current_cost = c;
                if c < best.1 {
                    best = (current.clone(), c);
                    improved = true;
                }
            }

            rounds += 1;
            stable = if improved { 0 } else { stable + 1 };
            temperature *= self.config.cooling_rate;
        }

        stats.rounds += rounds;
        info!(
            rounds,
            temperature,
            cost = best.1,
            accepted = stats.accepted,
            rejected = stats.rejected,
            "simulated annealing finished"
        );
        Ok(best)
    }
}
