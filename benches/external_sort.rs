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

//! Benchmarks for the spilling operators
//!
//! Run with: cargo bench --bench external_sort
//!
//! Each iteration builds fresh in-memory sources, so the numbers include
//! run generation, every merge pass and spill file cleanup.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spillway::{
    collect_tuples, Attribute, BlockNestedLoopJoin, DataType, ExecConfig, ExternalSort,
    JoinCondition, MaterializedOperator, Operator, SchemaBuilder, SortMergeJoin, Tuple, Value,
};

const PAGE_SIZE: usize = 512;

fn table(name: &str, rows: usize, keys: i64) -> Box<dyn Operator> {
    let schema = SchemaBuilder::new(name)
        .add("k", DataType::Integer)
        .add("v", DataType::Integer)
        .build();
    let tuples = (0..rows as i64)
        .map(|i| Tuple::from_values(vec![Value::integer((i * 7919) % keys), Value::integer(i)]))
        .collect();
    Box::new(MaterializedOperator::new(tuples, schema, PAGE_SIZE))
}

fn key(table: &str) -> Attribute {
    Attribute::new(table, "k", DataType::Integer)
}

fn bench_sort(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = ExecConfig::default()
        .with_page_size(PAGE_SIZE)
        .with_spill_dir(dir.path());
    let mut group = c.benchmark_group("external_sort");
    for buffers in [3usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("20k_rows", buffers), &buffers, |b, &buffers| {
            b.iter(|| {
                let input = table("t", 20_000, 1_000_000);
                let mut sort = ExternalSort::new(input, &[key("t")], buffers, &config).unwrap();
                black_box(collect_tuples(&mut sort).unwrap().len())
            })
        });
    }
    group.finish();
}

fn bench_joins(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = ExecConfig::default()
        .with_page_size(PAGE_SIZE)
        .with_spill_dir(dir.path());
    let on = vec![JoinCondition::new(key("l"), key("r"))];
    let mut group = c.benchmark_group("joins_2k_x_2k");

    group.bench_function("block_nested_loop", |b| {
        b.iter(|| {
            let (l, r) = (table("l", 2_000, 500), table("r", 2_000, 500));
            let mut join = BlockNestedLoopJoin::new(l, r, &on, 8, &config).unwrap();
            black_box(collect_tuples(&mut join).unwrap().len())
        })
    });

    group.bench_function("sort_merge", |b| {
        b.iter(|| {
            let (l, r) = (table("l", 2_000, 500), table("r", 2_000, 500));
            let mut join = SortMergeJoin::new(l, r, &on, 8, &config).unwrap();
            black_box(collect_tuples(&mut join).unwrap().len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_sort, bench_joins);
criterion_main!(benches);
