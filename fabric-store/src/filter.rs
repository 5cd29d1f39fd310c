//! Metadata filter evaluation shared by vector, document, and list
//! operations.
//!
//! Keys may use dotted paths for nested fields. Values may be scalars
//! (exact match), lists (any-of), or operator objects using `gt`, `gte`,
//! `lt`, `lte`, `ne`, `in`, and `nin`. Conditions are ANDed across keys.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A metadata filter: field path to expected value or operator object.
pub type Filter = Map<String, Value>;

const OPERATORS: [&str; 7] = ["gt", "gte", "lt", "lte", "ne", "in", "nin"];

/// Evaluates a filter against a metadata object.
#[must_use]
pub fn matches_filter(metadata: &Map<String, Value>, filter: &Filter) -> bool {
    filter.iter().all(|(path, expected)| {
        lookup_path(metadata, path)
            .is_some_and(|actual| matches_condition(actual, expected))
    })
}

fn lookup_path<'a>(metadata: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = metadata.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn matches_condition(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Object(object) if is_operator_object(object) => object
            .iter()
            .all(|(operator, operand)| apply_operator(actual, operator, operand)),
        Value::Array(any_of) => any_of.iter().any(|candidate| candidate == actual),
        scalar => scalar == actual,
    }
}

fn is_operator_object(object: &Map<String, Value>) -> bool {
    !object.is_empty() && object.keys().all(|key| OPERATORS.contains(&key.as_str()))
}

fn apply_operator(actual: &Value, operator: &str, operand: &Value) -> bool {
    match operator {
        "gt" => compare(actual, operand).is_some_and(|ord| ord == Ordering::Greater),
        "gte" => compare(actual, operand).is_some_and(|ord| ord != Ordering::Less),
        "lt" => compare(actual, operand).is_some_and(|ord| ord == Ordering::Less),
        "lte" => compare(actual, operand).is_some_and(|ord| ord != Ordering::Greater),
        "ne" => actual != operand,
        "in" => operand
            .as_array()
            .is_some_and(|candidates| candidates.contains(actual)),
        "nin" => operand
            .as_array()
            .is_some_and(|candidates| !candidates.contains(actual)),
        _ => false,
    }
}

fn compare(actual: &Value, operand: &Value) -> Option<Ordering> {
    match (actual, operand) {
        (Value::Number(left), Value::Number(right)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> Map<String, Value> {
        json!({
            "kind": "test",
            "score": 7,
            "owner": {"team": {"name": "athena"}},
            "tags": "alpha",
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn filter(value: Value) -> Filter {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn scalar_equality() {
        assert!(matches_filter(&metadata(), &filter(json!({"kind": "test"}))));
        assert!(!matches_filter(&metadata(), &filter(json!({"kind": "prod"}))));
    }

    #[test]
    fn missing_key_never_matches() {
        assert!(!matches_filter(&metadata(), &filter(json!({"absent": 1}))));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"owner.team.city": "x"}))
        ));
    }

    #[test]
    fn dotted_paths_resolve_nested_fields() {
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"owner.team.name": "athena"}))
        ));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"owner.team.name": "ergon"}))
        ));
    }

    #[test]
    fn list_means_any_of() {
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"kind": ["prod", "test"]}))
        ));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"kind": ["prod", "stage"]}))
        ));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"score": {"gt": 5, "lte": 7}}))
        ));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"score": {"gt": 7}}))
        ));
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"score": {"gte": 7}}))
        ));
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"score": {"lt": 8, "ne": 6}}))
        ));
    }

    #[test]
    fn membership_operators() {
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"score": {"in": [6, 7, 8]}}))
        ));
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"kind": {"nin": ["prod"]}}))
        ));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"kind": {"in": ["prod"]}}))
        ));
    }

    #[test]
    fn conditions_are_anded_across_keys() {
        assert!(matches_filter(
            &metadata(),
            &filter(json!({"kind": "test", "score": {"gte": 7}}))
        ));
        assert!(!matches_filter(
            &metadata(),
            &filter(json!({"kind": "test", "score": {"gt": 7}}))
        ));
    }

    #[test]
    fn plain_object_matches_literally() {
        let mut meta = metadata();
        meta.insert("exact".into(), json!({"a": 1}));
        assert!(matches_filter(&meta, &filter(json!({"exact": {"a": 1}}))));
        assert!(!matches_filter(&meta, &filter(json!({"exact": {"a": 2}}))));
    }
}
