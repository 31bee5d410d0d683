//! Property tests for filters, alignment and expression parsing
//!
//! Uses proptest to check invariants that must hold for any label set, series
//! set or expression shape.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use kuba_compose::query::evaluator::{evaluate_formula, join_series};
use kuba_compose::query::{
    parse_expression, AttributeKey, BinaryOp, FilterItem, FilterSet, Labels,
};
use kuba_compose::store::{SeriesKey, SeriesResult};
use kuba_compose::types::Sample;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Small label vocabulary so generated filters and labels collide often
fn label_value() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "web-1", "idle"]).prop_map(String::from)
}

fn labels() -> impl Strategy<Value = Labels> {
    (
        prop::option::of(label_value()),
        prop::option::of(label_value()),
    )
        .prop_map(|(state, host)| {
            let mut labels = Labels::new();
            if let Some(state) = state {
                labels.insert(AttributeKey::tag("state"), state);
            }
            if let Some(host) = host {
                labels.insert(AttributeKey::resource("host_name"), host);
            }
            labels
        })
}

/// Timestamp-sorted, deduplicated samples
fn samples() -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::btree_map(0i64..20, -100.0..100.0f64, 0..10).prop_map(|points| {
        points
            .into_iter()
            .map(|(ts, v)| Sample::new(ts * 1000, v))
            .collect()
    })
}

/// A series set with unique keys drawn from a small host vocabulary
fn series_set() -> impl Strategy<Value = Vec<SeriesResult>> {
    prop::collection::btree_map(0u8..6, samples(), 0..6).prop_map(|by_host| {
        by_host
            .into_iter()
            .map(|(host, samples)| {
                SeriesResult::new(
                    SeriesKey::from_pairs([("host_name", format!("h{}", host))]),
                    samples,
                )
            })
            .collect()
    })
}

fn keys(set: &[SeriesResult]) -> BTreeSet<SeriesKey> {
    set.iter().map(|s| s.key.clone()).collect()
}

// =============================================================================
// Filter Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_empty_filter_sets_match_everything(labels in labels()) {
        prop_assert!(FilterSet::empty().matches(&labels));
        prop_assert!(FilterSet::and(vec![]).matches(&labels));
        prop_assert!(FilterSet::or(vec![]).matches(&labels));
    }

    #[test]
    fn prop_equal_and_not_equal_are_complements(labels in labels(), value in label_value()) {
        let key = AttributeKey::tag("state");
        let eq = FilterItem::equal(key.clone(), value.as_str()).unwrap();
        let ne = FilterItem::not_equal(key, value.as_str()).unwrap();
        prop_assert_ne!(eq.matches(&labels), ne.matches(&labels));
    }

    #[test]
    fn prop_in_and_not_in_are_complements(
        labels in labels(),
        values in prop::collection::vec(label_value(), 1..4),
    ) {
        let key = AttributeKey::resource("host_name");
        let within = FilterItem::in_list(key.clone(), values.iter().map(String::as_str)).unwrap();
        let outside = FilterItem::not_in_list(key, values.iter().map(String::as_str)).unwrap();
        prop_assert_ne!(within.matches(&labels), outside.matches(&labels));
    }

    #[test]
    fn prop_and_implies_or(labels in labels(), a in label_value(), b in label_value()) {
        let items = vec![
            FilterItem::equal(AttributeKey::tag("state"), a.as_str()).unwrap(),
            FilterItem::equal(AttributeKey::resource("host_name"), b.as_str()).unwrap(),
        ];
        if FilterSet::and(items.clone()).matches(&labels) {
            prop_assert!(FilterSet::or(items).matches(&labels));
        }
    }
}

// =============================================================================
// Alignment Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_join_keeps_key_intersection(lhs in series_set(), rhs in series_set()) {
        let joined = join_series(BinaryOp::Add, &lhs, &rhs);
        let expected: BTreeSet<_> = keys(&lhs).intersection(&keys(&rhs)).cloned().collect();
        prop_assert_eq!(keys(&joined), expected);
    }

    #[test]
    fn prop_join_keeps_timestamp_intersection(lhs in series_set(), rhs in series_set()) {
        for series in join_series(BinaryOp::Mul, &lhs, &rhs) {
            let left = lhs.iter().find(|s| s.key == series.key).unwrap();
            let right = rhs.iter().find(|s| s.key == series.key).unwrap();
            let left_ts: BTreeSet<_> = left.samples.iter().map(|s| s.timestamp).collect();
            let right_ts: BTreeSet<_> = right.samples.iter().map(|s| s.timestamp).collect();
            let joined_ts: Vec<_> = series.samples.iter().map(|s| s.timestamp).collect();

            let expected: Vec<_> = left_ts.intersection(&right_ts).copied().collect();
            prop_assert_eq!(joined_ts, expected);
        }
    }

    #[test]
    fn prop_division_never_emits_for_zero_divisor(lhs in series_set(), rhs in series_set()) {
        for series in join_series(BinaryOp::Div, &lhs, &rhs) {
            let right = rhs.iter().find(|s| s.key == series.key).unwrap();
            for sample in &series.samples {
                let divisor = right
                    .samples
                    .iter()
                    .find(|s| s.timestamp == sample.timestamp)
                    .unwrap();
                prop_assert!(divisor.value != 0.0);
            }
        }
    }

    #[test]
    fn prop_evaluation_independent_of_insertion_order(a in series_set(), b in series_set()) {
        let expr = parse_expression("F", "A - B * 2").unwrap();

        let mut forward = BTreeMap::new();
        forward.insert("A".to_string(), a.clone());
        forward.insert("B".to_string(), b.clone());

        let mut backward = BTreeMap::new();
        backward.insert("B".to_string(), b);
        backward.insert("A".to_string(), a);

        prop_assert_eq!(
            evaluate_formula(&expr, &forward).unwrap(),
            evaluate_formula(&expr, &backward).unwrap()
        );
    }
}

// =============================================================================
// Parser Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_parser_never_panics(input in "[A-Z0-9 ()+*/.-]{0,24}") {
        let _ = parse_expression("F", &input);
    }

    #[test]
    fn prop_display_reparses_to_same_tree(
        names in prop::collection::vec(prop::sample::select(vec!["A", "B", "C"]), 1..6),
        ops in prop::collection::vec(prop::sample::select(vec!['+', '-', '*', '/']), 5),
    ) {
        let mut input = names[0].to_string();
        for (name, op) in names[1..].iter().zip(&ops) {
            input.push(*op);
            input.push_str(name);
        }
        let expr = parse_expression("F", &input).unwrap();
        let reparsed = parse_expression("F", &expr.to_string()).unwrap();
        prop_assert_eq!(expr, reparsed);
    }
}
