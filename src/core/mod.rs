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

//! Core types and definitions
//!
//! This module contains the fundamental types used throughout the engine:
//!
//! - [`DataType`] - Field types (INTEGER, REAL, TEXT(n)) and their page widths
//! - [`Value`] - Runtime field values with one total order
//! - [`Tuple`] - An immutable ordered sequence of values
//! - [`Batch`] - A fixed-capacity page of tuples
//! - [`Schema`], [`Attribute`], [`JoinCondition`] - Tuple layouts and keys
//! - [`Error`] - Error types for all engine operations

pub mod batch;
pub mod error;
pub mod schema;
pub mod tuple;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use batch::Batch;
pub use error::{Error, Result};
pub use schema::{Attribute, JoinCondition, KeyIndices, Schema, SchemaBuilder};
pub use tuple::Tuple;
pub use types::DataType;
pub use value::Value;

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Build a schema, fill a page with tuples and resolve a key through it
    #[test]
    fn test_schema_batch_integration() {
        let schema = SchemaBuilder::new("users")
            .add("id", DataType::Integer)
            .add("name", DataType::Text(12))
            .build();

        // 64-byte page, 16-byte tuples
        let capacity = Batch::capacity_for(64, schema.tuple_size());
        assert_eq!(capacity, 4);

        let mut batch = Batch::new(capacity);
        for (id, name) in [(3, "carol"), (1, "alice"), (2, "bob")] {
            batch
                .push(Tuple::from_values(vec![Value::integer(id), Value::text(name)]))
                .unwrap();
        }

        let key = schema
            .positions(&[Attribute::new("users", "id", DataType::Integer)])
            .unwrap();
        let mut tuples = batch.into_tuples();
        tuples.sort_by(|a, b| a.compare_keys(b, &key));
        let names: Vec<_> = tuples.iter().map(|t| t[1].to_string()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
