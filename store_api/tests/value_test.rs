#[macro_use]
extern crate hamcrest;
use hamcrest::prelude::*;
use serde_json::json;
use store_api::{attributes, Comparison, Key, Operation, Predicate, Request, Search, Value};

#[test]
fn predicates_compare_numbers_across_int_and_float() {
    let attrs = attributes! { "n" => 5, "x" => 2.5 };

    assert!(Predicate::new("n", Comparison::GreaterThan, 4.5).matches(&attrs));
    assert!(Predicate::new("x", Comparison::LessEqual, 3).matches(&attrs));
    assert!(!Predicate::new("n", Comparison::LessThan, 5).matches(&attrs));
    assert!(Predicate::new("n", Comparison::GreaterEqual, 5).matches(&attrs));
}

#[test]
fn predicate_on_missing_attribute_never_matches() {
    let attrs = attributes! { "v" => "towels" };

    assert!(!Predicate::equals("w", "towels").matches(&attrs));
    assert!(!Predicate::new("w", Comparison::LessThan, 1).matches(&attrs));
}

#[test]
fn contains_checks_lists_and_substrings() {
    let attrs = attributes! {
        "tags" => vec![Value::from("alpha"), Value::from("beta")],
        "name" => "ford prefect",
    };

    assert!(Predicate::new("tags", Comparison::Contains, "beta").matches(&attrs));
    assert!(!Predicate::new("tags", Comparison::Contains, "gamma").matches(&attrs));
    assert!(Predicate::new("name", Comparison::Contains, "prefect").matches(&attrs));
}

#[test]
fn values_serialize_untagged() {
    let attrs = attributes! { "v" => "towels", "n" => 42 };

    let encoded = serde_json::to_value(&attrs).unwrap();

    assert_eq!(encoded, json!({"v": "towels", "n": 42}));
    let decoded: store_api::Attributes = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, attrs);
}

#[test]
fn operation_table_names_each_operation_once() {
    let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.name()).collect();
    names.sort_unstable();
    names.dedup();

    assert_that!(names.len(), is(equal_to(Operation::ALL.len())));
    let streaming: Vec<Operation> = Operation::ALL
        .into_iter()
        .filter(|op| op.is_streaming())
        .collect();
    assert_eq!(streaming, vec![Operation::Search, Operation::SortedSearch]);
}

#[test]
fn requests_report_their_operation() {
    let get = Request::Get {
        space: "foo".to_string(),
        key: Key::from(42),
    };
    assert_eq!(get.operation(), Operation::Get);
    assert_eq!(get.space(), "foo");

    let search = Search::new("foo", vec![]);
    assert_eq!(search.operation(), Operation::Search);
    assert_eq!(search.sorted("n", 10, false).operation(), Operation::SortedSearch);
}
