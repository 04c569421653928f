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

//! Storage module
//!
//! This module contains the disk-facing side of execution:
//! - Configuration types (page size, spill directory, page budgets)
//! - Spill files holding sorted runs and materialized join inputs

pub mod config;
pub mod spill;

// Re-export config types
pub use config::{BufferBudget, ExecConfig, UniformBudget, MIN_JOIN_BUFFERS};

// Re-export spill types
pub use spill::{RunReader, RunWriter, SpillFile, SpillSpace};
