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

//! Error types for the execution engine
//!
//! This module defines all error types raised by operators, the spill layer
//! and the optimizer.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the execution engine
///
/// Everything except [`Error::CostEvaluation`] is fatal for the evaluation
/// that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Resource errors
    // =========================================================================
    /// A bounded in-memory structure would exceed its page budget
    #[error("{resource} exceeds its budget of {limit} tuples (needed {requested})")]
    ResourceExhausted {
        resource: &'static str,
        limit: usize,
        requested: usize,
    },

    /// A spill file operation failed
    #[error("spill {operation} failed on '{path}': {message}")]
    Io {
        operation: &'static str,
        path: String,
        message: String,
    },

    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// An operator was given fewer buffer pages than it needs
    #[error("{operator} needs at least {required} buffer pages, got {available}")]
    InsufficientBuffers {
        operator: &'static str,
        required: usize,
        available: usize,
    },

    /// An attribute was looked up in a schema that does not contain it
    #[error("attribute '{0}' not found in schema")]
    AttributeNotFound(String),

    /// The plan requests an algorithm or node the executor cannot build
    #[error("unsupported: {0}")]
    UnsupportedAlgorithm(String),

    /// Engine configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Plan errors
    // =========================================================================
    /// The plan tree is structurally broken
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The cost model failed on a plan
    #[error("cost evaluation failed: {0}")]
    CostEvaluation(String),

    // =========================================================================
    // Operator protocol errors
    // =========================================================================
    /// `next()` was called on an operator that was never opened
    #[error("{0}::next called before open")]
    NotOpen(&'static str),

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Wrap an I/O failure with the spill operation and file it happened on
    pub fn io(
        operation: &'static str,
        path: impl AsRef<std::path::Path>,
        err: std::io::Error,
    ) -> Self {
        Error::Io {
            operation,
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create an attribute lookup error
    pub fn attribute_not_found(name: impl Into<String>) -> Self {
        Error::AttributeNotFound(name.into())
    }

    /// Returns true for errors raised while compiling a plan
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBuffers { .. }
                | Error::AttributeNotFound(_)
                | Error::UnsupportedAlgorithm(_)
                | Error::InvalidConfig(_)
        )
    }

    /// Returns true if the optimizer may discard the plan and keep searching
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::CostEvaluation(_))
    }

    /// Returns true for spill file failures
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ResourceExhausted {
            resource: "right partition",
            limit: 40,
            requested: 41,
        };
        assert_eq!(
            err.to_string(),
            "right partition exceeds its budget of 40 tuples (needed 41)"
        );

        let err = Error::InsufficientBuffers {
            operator: "BlockNestedLoopJoin",
            required: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "BlockNestedLoopJoin needs at least 3 buffer pages, got 2"
        );

        assert_eq!(
            Error::NotOpen("ExternalSort").to_string(),
            "ExternalSort::next called before open"
        );
    }

    #[test]
    fn test_io_error_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::io("read", "/tmp/run-0", io);
        assert!(err.is_io());
        let msg = err.to_string();
        assert!(msg.contains("read"));
        assert!(msg.contains("/tmp/run-0"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::attribute_not_found("a.x").is_configuration());
        assert!(Error::UnsupportedAlgorithm("hash join".into()).is_configuration());
        assert!(!Error::internal("x").is_configuration());
        assert!(Error::CostEvaluation("nan".into()).is_transient());
        assert!(!Error::InvalidPlan("cycle".into()).is_transient());
    }
}
