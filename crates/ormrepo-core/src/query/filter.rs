//! Filter evaluation.
//!
//! [`FilterEvaluator`] evaluates store filters against fetched rows. Field
//! paths may cross loaded relations (`team.name`); a path that cannot be
//! followed reads as null.

use std::cmp::Ordering;

use ormrepo_proto::{FilterExpr, Row, Value};

/// Evaluates filter expressions against rows.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a filter expression against a row.
    ///
    /// Comparisons against null never match, mirroring SQL.
    pub fn evaluate(filter: &FilterExpr, row: &Row) -> bool {
        match filter {
            FilterExpr::Eq { field, value } => {
                Self::compare_field(row, field, value, Self::values_equal)
            }
            FilterExpr::Ne { field, value } => {
                Self::compare_field(row, field, value, |a, b| !Self::values_equal(a, b))
            }
            FilterExpr::Lt { field, value } => Self::compare_field(row, field, value, |a, b| {
                Self::compare_values(a, b).is_some_and(Ordering::is_lt)
            }),
            FilterExpr::Le { field, value } => Self::compare_field(row, field, value, |a, b| {
                Self::compare_values(a, b).is_some_and(Ordering::is_le)
            }),
            FilterExpr::Gt { field, value } => Self::compare_field(row, field, value, |a, b| {
                Self::compare_values(a, b).is_some_and(Ordering::is_gt)
            }),
            FilterExpr::Ge { field, value } => Self::compare_field(row, field, value, |a, b| {
                Self::compare_values(a, b).is_some_and(Ordering::is_ge)
            }),
            FilterExpr::In { field, values } => match Self::field_value(row, field) {
                Some(fv) => values.iter().any(|v| Self::values_equal(fv, v)),
                None => false,
            },
            FilterExpr::NotIn { field, values } => match Self::field_value(row, field) {
                Some(fv) => !values.iter().any(|v| Self::values_equal(fv, v)),
                None => false,
            },
            FilterExpr::IsNull { field } => Self::field_value(row, field).is_none(),
            FilterExpr::IsNotNull { field } => Self::field_value(row, field).is_some(),
            FilterExpr::Like { field, pattern } => match Self::field_value(row, field) {
                Some(Value::String(s)) => Self::like_match(s, pattern),
                _ => false,
            },
            FilterExpr::NotLike { field, pattern } => match Self::field_value(row, field) {
                Some(Value::String(s)) => !Self::like_match(s, pattern),
                _ => false,
            },
            FilterExpr::And(filters) => filters.iter().all(|f| Self::evaluate(f, row)),
            FilterExpr::Or(filters) => filters.iter().any(|f| Self::evaluate(f, row)),
            FilterExpr::Not(inner) => !Self::evaluate(inner, row),
        }
    }

    /// Non-null value at a path.
    fn field_value<'a>(row: &'a Row, field: &str) -> Option<&'a Value> {
        row.lookup(field).filter(|v| !v.is_null())
    }

    fn compare_field<F>(row: &Row, field: &str, value: &Value, comparator: F) -> bool
    where
        F: FnOnce(&Value, &Value) -> bool,
    {
        match Self::field_value(row, field) {
            Some(fv) if !value.is_null() => comparator(fv, value),
            _ => false,
        }
    }

    /// Check if two values are equal, widening integers.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Int32(a), Value::Int64(b)) => (*a as i64) == *b,
            (Value::Int64(a), Value::Int32(b)) => *a == (*b as i64),
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::Float64(a), Value::Int32(b)) => *a == *b as f64,
            (Value::Float64(a), Value::Int64(b)) => *a == *b as f64,
            (Value::Int32(a), Value::Float64(b)) => *a as f64 == *b,
            (Value::Int64(a), Value::Float64(b)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }

    /// Compare two values, returning their ordering if comparable.
    pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int64(b)) => Some((*a as i64).cmp(b)),
            (Value::Int64(a), Value::Int32(b)) => Some(a.cmp(&(*b as i64))),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Float64(a), Value::Int32(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Int32(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting: nulls first, incomparable values equal.
    pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        let a = a.filter(|v| !v.is_null());
        let b = b.filter(|v| !v.is_null());
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => Self::compare_values(a, b).unwrap_or(Ordering::Equal),
        }
    }

    /// Escape `%`, `_` and `\` so a value matches itself literally.
    pub fn escape_like(value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '%' | '_' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    /// Match a string against a SQL LIKE pattern.
    ///
    /// Supports:
    /// - `%` matches zero or more characters
    /// - `_` matches exactly one character
    /// - `\%`, `\_` and `\\` match the literal character
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let mut chars = value.chars().peekable();
        let mut pattern_chars = pattern.chars().peekable();

        Self::like_match_recursive(&mut chars, &mut pattern_chars)
    }

    fn like_match_recursive(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        pattern: &mut std::iter::Peekable<std::str::Chars>,
    ) -> bool {
        loop {
            match (pattern.peek().copied(), chars.peek().copied()) {
                (None, None) => return true,
                (None, Some(_)) => return false,
                (Some('%'), _) => {
                    pattern.next();
                    if pattern.peek().is_none() {
                        return true;
                    }
                    // Try matching % with 0, 1, 2, ... characters
                    loop {
                        let mut pattern_clone = pattern.clone();
                        let mut chars_clone = chars.clone();
                        if Self::like_match_recursive(&mut chars_clone, &mut pattern_clone) {
                            return true;
                        }
                        if chars.next().is_none() {
                            return false;
                        }
                    }
                }
                (Some('_'), Some(_)) => {
                    pattern.next();
                    chars.next();
                }
                (Some('_'), None) => return false,
                (Some('\\'), _) => {
                    pattern.next();
                    match (pattern.peek().copied(), chars.peek().copied()) {
                        (Some(p), Some(c)) if p == c => {
                            pattern.next();
                            chars.next();
                        }
                        _ => return false,
                    }
                }
                (Some(p), Some(c)) => {
                    if p != c {
                        return false;
                    }
                    pattern.next();
                    chars.next();
                }
                (Some(_), None) => return false,
            }
        }
    }
}
