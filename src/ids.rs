use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Student numbers and test ids are unbounded decimal integers.
///
/// The value is kept as its canonical decimal text (no leading zeros, no
/// `+`, never `-0`) so equality on the text is equality on the number and
/// SQLite stores it without any width limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NumericId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {0:?} is not a decimal integer")]
    NotDecimal(String),
}

impl NumericId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NumericId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() {
            return Err(IdError::Empty);
        }
        let (negative, digits) = match t.as_bytes()[0] {
            b'-' => (true, &t[1..]),
            b'+' => (false, &t[1..]),
            _ => (false, t),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::NotDecimal(t.to_string()));
        }
        let stripped = digits.trim_start_matches('0');
        if stripped.is_empty() {
            return Ok(Self("0".to_string()));
        }
        if negative {
            Ok(Self(format!("-{stripped}")))
        } else {
            Ok(Self(stripped.to_string()))
        }
    }
}

impl From<u64> for NumericId {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl From<i64> for NumericId {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl fmt::Display for NumericId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for NumericId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for NumericId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e: IdError| FromSqlError::Other(Box::new(e)))
    }
}
