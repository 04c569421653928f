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

//! Core type definitions
//!
//! Field types carried by tuples, and the byte widths used for page accounting.

use std::fmt;
use std::str::FromStr;

use super::error::Error;

/// Field types supported by the engine
///
/// The width of a type is what a field of that type costs inside a page.
/// Batch capacity is derived from the sum of these widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Signed integer, accounted as 4 bytes
    Integer,

    /// Floating point number, accounted as 4 bytes
    Real,

    /// Text of at most `n` bytes
    Text(usize),
}

impl DataType {
    /// Width of a field of this type in bytes
    pub fn width(&self) -> usize {
        match self {
            DataType::Integer | DataType::Real => 4,
            DataType::Text(n) => *n,
        }
    }

    /// Returns true if this is a numeric type
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Real)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Real => write!(f, "REAL"),
            DataType::Text(n) => write!(f, "TEXT({})", n),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    /// Parses `INTEGER`, `REAL` or `TEXT(n)`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "INT" | "INTEGER" => Ok(DataType::Integer),
            "REAL" | "FLOAT" => Ok(DataType::Real),
            _ => {
                let width = upper
                    .strip_prefix("TEXT(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|n| n.trim().parse::<usize>().ok())
                    .ok_or_else(|| Error::internal(format!("unknown data type '{}'", s)))?;
                Ok(DataType::Text(width))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(DataType::Integer.width(), 4);
        assert_eq!(DataType::Real.width(), 4);
        assert_eq!(DataType::Text(20).width(), 20);
    }

    #[test]
    fn test_parse() {
        assert_eq!("integer".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!("REAL".parse::<DataType>().unwrap(), DataType::Real);
        assert_eq!("text(12)".parse::<DataType>().unwrap(), DataType::Text(12));
        assert!("blob".parse::<DataType>().is_err());
        assert!("TEXT(x)".parse::<DataType>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Text(8).to_string(), "TEXT(8)");
        assert_eq!(DataType::Integer.to_string(), "INTEGER");
    }
}
