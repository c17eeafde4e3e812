// SPDX-License-Identifier: MIT

//! Check expression evaluator
//!
//! Values arriving from the command line are always strings, so numeric
//! and boolean comparisons also accept their string spellings (`"85"`,
//! `"true"`).

use super::ast::{CompareOp, Expression, Literal};
use serde_json::{Map, Value};

/// Evaluate an expression against instance context data
pub fn evaluate(expr: &Expression, context: &Map<String, Value>) -> bool {
    match expr {
        Expression::Constant(b) => *b,
        Expression::Present(path) => lookup(context, path).is_some(),
        Expression::Compare { path, op, value } => compare(lookup(context, path), *op, value),
        Expression::And(l, r) => evaluate(l, context) && evaluate(r, context),
        Expression::Or(l, r) => evaluate(l, context) || evaluate(r, context),
        Expression::Not(inner) => !evaluate(inner, context),
    }
}

/// Resolve a dotted path; numeric segments index into arrays
fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::NotEq => !equals(left, right),
        CompareOp::Gt => ordered(left, right, |a, b| a > b),
        CompareOp::Gte => ordered(left, right, |a, b| a >= b),
        CompareOp::Lt => ordered(left, right, |a, b| a < b),
        CompareOp::Lte => ordered(left, right, |a, b| a <= b),
        CompareOp::Contains => contains(left, right),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn equals(left: Option<&Value>, right: &Literal) -> bool {
    let Some(left) = left else {
        return *right == Literal::Null;
    };
    match right {
        Literal::Null => left.is_null(),
        Literal::String(s) => left.as_str() == Some(s.as_str()),
        Literal::Number(n) => as_number(left).is_some_and(|v| (v - n).abs() < f64::EPSILON),
        Literal::Boolean(b) => as_bool(left) == Some(*b),
    }
}

fn ordered(left: Option<&Value>, right: &Literal, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.and_then(as_number), right) {
        (Some(l), Literal::Number(r)) => cmp(l, *r),
        _ => false,
    }
}

fn contains(left: Option<&Value>, right: &Literal) -> bool {
    match left {
        Some(Value::String(s)) => match right {
            Literal::String(needle) => s.contains(needle.as_str()),
            _ => false,
        },
        Some(Value::Array(items)) => items.iter().any(|item| equals(Some(item), right)),
        Some(Value::Object(obj)) => match right {
            Literal::String(key) => obj.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}
