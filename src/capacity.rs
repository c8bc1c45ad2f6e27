//! Capacity Module
//!
//! Parses human capacity expressions such as `"2kB"`, `"2kiB"` or `"1.5 MiB"`
//! into byte counts. Suffixes with an `i` are binary (1024-based), the others
//! decimal (1000-based). Unit letters are case-insensitive.

use std::fmt;

use serde::Deserialize;

use crate::error::{CacheError, Result};

// == Capacity ==
/// A byte budget, either already in bytes or as an unparsed expression.
///
/// Deserializes from either a JSON integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Capacity {
    /// Exact number of bytes
    Bytes(u64),
    /// Human expression, parsed with [`parse_capacity`]
    Expr(String),
}

impl Capacity {
    // == Resolve ==
    /// Returns the budget in bytes.
    pub fn to_bytes(&self) -> Result<u64> {
        match self {
            Capacity::Bytes(bytes) => Ok(*bytes),
            Capacity::Expr(expr) => parse_capacity(expr),
        }
    }
}

impl From<u64> for Capacity {
    fn from(bytes: u64) -> Self {
        Capacity::Bytes(bytes)
    }
}

impl From<&str> for Capacity {
    fn from(expr: &str) -> Self {
        Capacity::Expr(expr.to_string())
    }
}

impl From<String> for Capacity {
    fn from(expr: String) -> Self {
        Capacity::Expr(expr)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bytes(bytes) => write!(f, "{}B", bytes),
            Capacity::Expr(expr) => f.write_str(expr),
        }
    }
}

// == Unit Table ==
fn unit_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gib" => 1 << 30,
        "t" | "tb" => 1_000_000_000_000,
        "tib" => 1 << 40,
        _ => return None,
    };
    Some(multiplier)
}

// == Parse ==
/// Converts a capacity expression into a byte count.
///
/// Accepts an optional fractional number followed by an optional unit,
/// with optional whitespace between them: `"512"`, `"2kB"`, `"2 KiB"`,
/// `"1.5MB"`.
pub fn parse_capacity(expr: &str) -> Result<u64> {
    let invalid = || CacheError::InvalidCapacity(expr.to_string());

    let trimmed = expr.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(invalid());
    }

    let multiplier = unit_multiplier(unit.trim()).ok_or_else(invalid)?;

    if number.contains('.') {
        let amount: f64 = number.parse().map_err(|_| invalid())?;
        let bytes = (amount * multiplier as f64).round();
        if !bytes.is_finite() || bytes > u64::MAX as f64 {
            return Err(invalid());
        }
        Ok(bytes as u64)
    } else {
        let amount: u64 = number.parse().map_err(|_| invalid())?;
        amount.checked_mul(multiplier).ok_or_else(invalid)
    }
}
