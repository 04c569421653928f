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

//! Field values
//!
//! [`Value`] is what a tuple field holds at runtime. Values have one total
//! order, used by every sort and join key comparison in the engine:
//! numbers compare numerically across Integer and Real, and every number
//! orders before any text.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::types::DataType;

/// A runtime field value
///
/// Text uses `Arc<str>` so that cloning a tuple into a join result or a
/// priority queue entry does not copy string bytes.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Real(f64),

    /// UTF-8 text
    Text(Arc<str>),
}

impl Value {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an integer value
    pub fn integer(value: i64) -> Self {
        Value::Integer(value)
    }

    /// Create a real value
    pub fn real(value: f64) -> Self {
        Value::Real(value)
    }

    /// Create a text value
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(Arc::from(value.into()))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Data type of this value; text reports its own byte length as width
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Integer(_) => DataType::Integer,
            Value::Real(_) => DataType::Real,
            Value::Text(s) => DataType::Text(s.len()),
        }
    }

    /// Integer content, truncating reals
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Real(v) => Some(*v as i64),
            Value::Text(_) => None,
        }
    }

    /// Numeric content as f64
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// Text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values under the engine's total order
    pub fn compare(&self, other: &Value) -> Ordering {
        self.cmp(other)
    }
}

fn compare_reals(a: f64, b: f64) -> Ordering {
    // NaN sorts after every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// 2^63 as f64; every real in `[-TWO_POW_63, TWO_POW_63)` truncates to an i64 exactly
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer against a real.
///
/// Casting the integer to f64 rounds above 2^53 and breaks transitivity,
/// so the real is split into its integer and fractional parts instead.
fn compare_integer_real(a: i64, b: f64) -> Ordering {
    if b.is_nan() || b >= TWO_POW_63 {
        return Ordering::Less;
    }
    if b < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal => compare_reals(0.0, b - whole),
        ord => ord,
    }
}

/// Integer an in-range integral real is equal to
fn integral_real(v: f64) -> Option<i64> {
    if v.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&v) {
        Some(v as i64)
    } else {
        None
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => compare_reals(*a, *b),
            (Value::Integer(a), Value::Real(b)) => compare_integer_real(*a, *b),
            (Value::Real(a), Value::Integer(b)) => compare_integer_real(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with Eq: Integer(5) == Real(5.0)
        match self {
            Value::Integer(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Value::Real(v) => match integral_real(*v) {
                Some(i) => {
                    0u8.hash(state);
                    i.hash(state);
                }
                None if v.is_nan() => 3u8.hash(state),
                None => {
                    1u8.hash(state);
                    v.to_bits().hash(state);
                }
            },
            Value::Text(s) => {
                2u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

// =========================================================================
// From implementations for convenient construction
// =========================================================================

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(Arc::from(v))
    }
}
