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

//! Order-By Operator.
//!
//! Streams the input back in ascending order of the given attributes,
//! one sorted page per `next()` call.

use crate::core::{Attribute, Batch, Result, Schema};
use crate::executor::operator::Operator;
use crate::executor::sort::ExternalSort;
use crate::storage::ExecConfig;

/// Order-By Operator.
pub struct OrderBy {
    sorted: ExternalSort,
}

impl OrderBy {
    /// Create an order-by on `attributes` of `input`, sorting with
    /// `num_buffers` pages.
    pub fn new(
        input: Box<dyn Operator>,
        attributes: &[Attribute],
        num_buffers: usize,
        config: &ExecConfig,
    ) -> Result<Self> {
        Ok(Self {
            sorted: ExternalSort::new(input, attributes, num_buffers, config)?,
        })
    }
}

impl Operator for OrderBy {
    fn open(&mut self) -> Result<()> {
        self.sorted.open()
    }

    fn next(&mut self) -> Result<Option<Batch>> {
        self.sorted.next()
    }

    fn close(&mut self) -> Result<()> {
        self.sorted.close()
    }

    fn schema(&self) -> &Schema {
        self.sorted.schema()
    }

    fn name(&self) -> &str {
        "OrderBy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Error, SchemaBuilder, Tuple, Value};
    use crate::executor::operator::{collect_tuples, MaterializedOperator};

    #[test]
    fn test_order_by_two_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecConfig::default().with_page_size(32).with_spill_dir(dir.path());
        let schema = SchemaBuilder::new("emp")
            .add("dept", DataType::Text(8))
            .add("age", DataType::Integer)
            .build();
        let rows = [("ops", 40), ("dev", 31), ("ops", 22), ("dev", 25), ("hr", 50)];
        let tuples = rows
            .iter()
            .map(|&(d, a)| Tuple::from_values(vec![Value::text(d), Value::integer(a)]))
            .collect();
        let input = MaterializedOperator::new(tuples, schema, 32);
        let keys = vec![
            Attribute::new("emp", "dept", DataType::Text(8)),
            Attribute::new("emp", "age", DataType::Integer),
        ];
        let mut order_by = OrderBy::new(Box::new(input), &keys, 3, &config).unwrap();
        assert_eq!(order_by.name(), "OrderBy");
        let out: Vec<String> = collect_tuples(&mut order_by)
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(
            out,
            vec!["(dev, 25)", "(dev, 31)", "(hr, 50)", "(ops, 22)", "(ops, 40)"]
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_order_by_unknown_attribute() {
        let schema = SchemaBuilder::new("emp").add("age", DataType::Integer).build();
        let input = MaterializedOperator::new(vec![], schema, 32);
        let keys = vec![Attribute::new("emp", "salary", DataType::Integer)];
        let result = OrderBy::new(Box::new(input), &keys, 3, &ExecConfig::default());
        assert!(matches!(result, Err(Error::AttributeNotFound(_))));
    }
}
