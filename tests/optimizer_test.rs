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

//! Optimizer integration tests
//!
//! Search a four-way join, compile the winner and check that it returns the
//! same tuples as the starting plan.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use spillway::optimizer::{
    make_exec_plan, random_neighbor, InitialPlanSource, JoinGraph, MemorySource,
};
use spillway::{
    collect_tuples, Attribute, DataType, ExecConfig, JoinAlgorithm, JoinCondition, Plan,
    RandomInitialPlan, RandomOptimizer, Result, Schema, SchemaBuilder, SearchConfig, Tuple,
    Value,
};

const SIZES: [(&str, usize); 4] = [("cust", 12), ("ord", 40), ("item", 60), ("part", 8)];

fn schema(table: &str) -> Schema {
    SchemaBuilder::new(table)
        .add("id", DataType::Integer)
        .add("ref", DataType::Integer)
        .build()
}

fn attr(table: &str, column: &str) -> Attribute {
    Attribute::new(table, column, DataType::Integer)
}

/// cust <- ord <- item -> part
fn graph() -> JoinGraph {
    let mut graph = JoinGraph::new();
    for (table, _) in SIZES {
        graph = graph.relation(table, schema(table));
    }
    graph
        .condition(JoinCondition::new(attr("ord", "ref"), attr("cust", "id")))
        .condition(JoinCondition::new(attr("item", "id"), attr("ord", "id")))
        .condition(JoinCondition::new(attr("item", "ref"), attr("part", "id")))
}

/// Deterministic data: row `i` of a table has id `i` and a reference into
/// the table it points at
fn source() -> MemorySource {
    let mut source = MemorySource::new(256);
    for (table, rows) in SIZES {
        let modulus = match table {
            "ord" => 12,
            "item" => 8,
            _ => 5,
        };
        let tuples = (0..rows as i64)
            .map(|i| {
                let id = if table == "item" { i % 40 } else { i };
                Tuple::from_values(vec![Value::integer(id), Value::integer((i * 7) % modulus)])
            })
            .collect();
        source.insert(table, tuples);
    }
    source
}

fn tables_of(schema: &Schema) -> BTreeSet<&str> {
    schema.attributes().iter().map(|a| a.table.as_str()).collect()
}

fn estimate(schema: &Schema) -> f64 {
    let tables = tables_of(schema);
    let product: f64 = SIZES
        .iter()
        .filter(|(t, _)| tables.contains(t))
        .map(|&(_, n)| n as f64)
        .product();
    product * 0.1f64.powi(tables.len() as i32 - 1)
}

/// Textbook page-count formulas over guessed cardinalities
fn cost(plan: &Plan) -> Result<f64> {
    let mut total = 0.0;
    for id in plan.post_order()? {
        let Some(join) = plan.join(id) else { continue };
        let l = estimate(plan.schema_of(join.left)?);
        let r = estimate(plan.schema_of(join.right)?);
        total += match join.algorithm {
            JoinAlgorithm::NestedLoop => l + l * r,
            JoinAlgorithm::BlockNestedLoop => l + (l / 6.0).ceil() * r,
            JoinAlgorithm::SortMerge => 3.0 * (l + r) + l.max(1.0).log2() * l,
            JoinAlgorithm::Hash => f64::INFINITY,
        };
    }
    Ok(total)
}

fn run(plan: &Plan, config: &ExecConfig) -> Vec<Vec<i64>> {
    let mut op = make_exec_plan(plan, config, config, &mut source()).unwrap();
    let tuples = collect_tuples(op.as_mut()).unwrap();
    // Column order depends on the join tree; compare by (table, column)
    let mut attrs: Vec<(usize, &Attribute)> =
        plan.schema().attributes().iter().enumerate().collect();
    attrs.sort_by(|a, b| (&a.1.table, &a.1.column).cmp(&(&b.1.table, &b.1.column)));
    let mut rows: Vec<Vec<i64>> = tuples
        .iter()
        .map(|t| attrs.iter().map(|&(i, _)| t[i].as_int64().unwrap()).collect())
        .collect();
    rows.sort();
    rows
}

#[test]
fn optimized_plan_returns_the_same_tuples() {
    let dir = tempfile::tempdir().unwrap();
    let config = ExecConfig::default()
        .with_page_size(256)
        .with_spill_dir(dir.path())
        .with_num_buffers(4)
        .with_buffers_per_join(8);

    let source = RandomInitialPlan::new(graph());
    let start = source.initial_plan(&mut StdRng::seed_from_u64(1)).unwrap();
    let outcome = RandomOptimizer::from_seed(SearchConfig::default(), 1)
        .optimize(&source, &cost)
        .unwrap();

    let best_start = outcome
        .stats
        .initial_costs
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    assert!(outcome.cost <= best_start);
    assert_eq!(outcome.plan.num_joins(), 3);

    let expected = run(&start, &config);
    assert!(!expected.is_empty());
    assert_eq!(run(&outcome.plan, &config), expected);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn annealing_from_a_fixed_plan() {
    let start = RandomInitialPlan::new(graph())
        .with_algorithms(&[JoinAlgorithm::NestedLoop])
        .initial_plan(&mut StdRng::seed_from_u64(8))
        .unwrap();
    let seed_cost = cost(&start).unwrap();
    let outcome = RandomOptimizer::from_seed(SearchConfig::default(), 8)
        .simulated_annealing(start.clone(), &cost)
        .unwrap();
    assert!(outcome.cost <= seed_cost);
    assert_eq!(cost(&outcome.plan).unwrap(), outcome.cost);

    // A fixed plan is also a valid starting point for the whole search
    let outcome = RandomOptimizer::from_seed(SearchConfig::default().with_restarts(2), 8)
        .optimize(&start, &cost)
        .unwrap();
    assert_eq!(outcome.stats.initial_costs, vec![seed_cost, seed_cost]);
    assert!(outcome.cost <= seed_cost);
}

#[test]
fn random_walk_keeps_join_indices_and_relations() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut plan = RandomInitialPlan::new(graph())
        .with_order_by(vec![attr("cust", "id")])
        .initial_plan(&mut rng)
        .unwrap();
    let all_tables: BTreeSet<&str> = SIZES.iter().map(|&(t, _)| t).collect();
    for _ in 0..300 {
        plan = random_neighbor(&plan, &JoinAlgorithm::EXECUTABLE, &mut rng).unwrap();
        plan.validate().unwrap();
        assert!((0..3).all(|i| plan.find_join(i).is_some()));
        assert_eq!(tables_of(plan.schema()), all_tables);
        assert!(plan.to_string().starts_with("OrderBy [cust.id]\n"));
    }
}
