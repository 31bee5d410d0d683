//! Formula evaluation
//!
//! Evaluates a parsed [`Expr`] over the series sets of the queries it
//! references. Binary operations between two series sets align them with an
//! inner join on [`SeriesKey`], then an inner join on timestamp. Constants are
//! broadcast over every sample. Division by zero drops the sample.

use std::collections::{BTreeMap, HashMap};

use super::expression::{BinaryOp, Expr};
use crate::error::{Error, Result};
use crate::store::{SeriesKey, SeriesResult};
use crate::types::Sample;

/// Intermediate value while walking an expression
#[derive(Debug, Clone)]
enum Operand {
    Series(Vec<SeriesResult>),
    /// `None` after a constant division by zero
    Scalar(Option<f64>),
}

/// Evaluate `expr` against the results computed so far
///
/// Every referenced name must already be present in `results`; the planner
/// orders formulas so that this holds.
pub fn evaluate_formula(
    expr: &Expr,
    results: &BTreeMap<String, Vec<SeriesResult>>,
) -> Result<Vec<SeriesResult>> {
    match evaluate(expr, results)? {
        Operand::Series(series) => Ok(series),
        Operand::Scalar(_) => Err(Error::Internal(format!(
            "expression '{}' does not reference any query",
            expr
        ))),
    }
}

fn evaluate(expr: &Expr, results: &BTreeMap<String, Vec<SeriesResult>>) -> Result<Operand> {
    match expr {
        Expr::Reference(name) => results
            .get(name)
            .map(|series| Operand::Series(series.clone()))
            .ok_or_else(|| Error::Internal(format!("result for '{}' is not available", name))),
        Expr::Constant(value) => Ok(Operand::Scalar(Some(*value))),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, results)?;
            let rhs = evaluate(rhs, results)?;
            Ok(apply(*op, lhs, rhs))
        }
    }
}

fn apply(op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
    match (lhs, rhs) {
        (Operand::Scalar(l), Operand::Scalar(r)) => {
            Operand::Scalar(l.zip(r).and_then(|(l, r)| op.apply(l, r)))
        }
        (Operand::Series(series), Operand::Scalar(r)) => Operand::Series(map_samples(series, |v| {
            r.and_then(|r| op.apply(v, r))
        })),
        (Operand::Scalar(l), Operand::Series(series)) => Operand::Series(map_samples(series, |v| {
            l.and_then(|l| op.apply(l, v))
        })),
        (Operand::Series(l), Operand::Series(r)) => Operand::Series(join_series(op, &l, &r)),
    }
}

fn map_samples(series: Vec<SeriesResult>, f: impl Fn(f64) -> Option<f64>) -> Vec<SeriesResult> {
    series
        .into_iter()
        .map(|s| {
            let samples = s
                .samples
                .iter()
                .filter_map(|sample| f(sample.value).map(|v| Sample::new(sample.timestamp, v)))
                .collect();
            SeriesResult::new(s.key, samples)
        })
        .collect()
}

/// Inner join two series sets on key, then on timestamp
///
/// Output follows the left operand's order and keeps its key's display order.
pub fn join_series(op: BinaryOp, lhs: &[SeriesResult], rhs: &[SeriesResult]) -> Vec<SeriesResult> {
    let by_key: HashMap<&SeriesKey, &SeriesResult> = rhs.iter().map(|s| (&s.key, s)).collect();

    lhs.iter()
        .filter_map(|left| {
            by_key.get(&left.key).map(|right| {
                SeriesResult::new(left.key.clone(), join_samples(op, &left.samples, &right.samples))
            })
        })
        .collect()
}

/// Merge-join two timestamp-sorted sample lists
fn join_samples(op: BinaryOp, lhs: &[Sample], rhs: &[Sample]) -> Vec<Sample> {
    let mut out = Vec::with_capacity(lhs.len().min(rhs.len()));
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        let (l, r) = (lhs[i], rhs[j]);
        if l.timestamp < r.timestamp {
            i += 1;
        } else if l.timestamp > r.timestamp {
            j += 1;
        } else {
            if let Some(value) = op.apply(l.value, r.value) {
                out.push(Sample::new(l.timestamp, value));
            }
            i += 1;
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::parse_expression;

    fn key(host: &str) -> SeriesKey {
        SeriesKey::from_pairs([("host_name", host)])
    }

    fn series(host: &str, points: &[(i64, f64)]) -> SeriesResult {
        SeriesResult::new(key(host), points.iter().copied().map(Sample::from).collect())
    }

    fn eval(expr: &str, results: &BTreeMap<String, Vec<SeriesResult>>) -> Vec<SeriesResult> {
        evaluate_formula(&parse_expression("F", expr).unwrap(), results).unwrap()
    }

    #[test]
    fn test_inner_join_on_key() {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), vec![series("k1", &[(1, 1.0)]), series("k2", &[(1, 2.0)])]);
        results.insert("B".to_string(), vec![series("k2", &[(1, 3.0)]), series("k3", &[(1, 4.0)])]);

        let out = eval("A + B", &results);
        assert_eq!(out, vec![series("k2", &[(1, 5.0)])]);
    }

    #[test]
    fn test_inner_join_on_timestamp() {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), vec![series("k", &[(1, 1.0), (2, 2.0), (4, 4.0)])]);
        results.insert("B".to_string(), vec![series("k", &[(2, 10.0), (3, 10.0), (4, 10.0)])]);

        assert_eq!(eval("A * B", &results), vec![series("k", &[(2, 20.0), (4, 40.0)])]);
    }

    #[test]
    fn test_division_by_zero_drops_sample() {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), vec![series("k1", &[(1, 10.0)])]);
        results.insert("B".to_string(), vec![series("k1", &[(1, 0.0)])]);

        // The key survives with no samples
        assert_eq!(eval("A / B", &results), vec![series("k1", &[])]);
    }

    #[test]
    fn test_constants_broadcast() {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), vec![series("k", &[(1, 80.0)])]);
        results.insert("B".to_string(), vec![series("k", &[(1, 100.0)])]);

        assert_eq!(eval("A / B * 100", &results), vec![series("k", &[(1, 80.0)])]);
        assert_eq!(eval("1 - A / B", &results)[0].samples[0].value, 1.0 - 0.8);
        assert_eq!(eval("A / (1 - 1)", &results), vec![series("k", &[])]);
    }

    #[test]
    fn test_key_dimension_order_ignored() {
        let mut results = BTreeMap::new();
        results.insert(
            "A".to_string(),
            vec![SeriesResult::new(
                SeriesKey::from_pairs([("a", "1"), ("b", "2")]),
                vec![Sample::new(1, 6.0)],
            )],
        );
        results.insert(
            "B".to_string(),
            vec![SeriesResult::new(
                SeriesKey::from_pairs([("b", "2"), ("a", "1")]),
                vec![Sample::new(1, 3.0)],
            )],
        );
        assert_eq!(eval("A / B", &results)[0].samples, vec![Sample::new(1, 2.0)]);
    }

    #[test]
    fn test_missing_result_is_internal_error() {
        let expr = parse_expression("F", "A + B").unwrap();
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), vec![]);
        assert!(matches!(
            evaluate_formula(&expr, &results),
            Err(Error::Internal(_))
        ));
    }
}
