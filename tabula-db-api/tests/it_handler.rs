//! Handler behavior over a live registry: caching, single-flight,
//! replacement and error propagation.

mod support;

use std::sync::{Arc, Barrier};
use support::{expenses, init_logging, labels, numbers};
use tabula_db_api::{ApiError, DataSetHandler, DataSetRegistry};
use tabula_db_core::{parse_date, DataSetBuilder, Value};
use tabula_db_query::{
    AggregateFunction, ColumnGroup, DataSetLookup, FilterNode, GroupOp, QueryOptions, SortCriterion,
};

fn totals_by_department(uuid: &str) -> DataSetLookup {
    DataSetLookup::new(uuid)
        .group(
            GroupOp::new()
                .group_by(ColumnGroup::new("department"))
                .aggregate("amount", AggregateFunction::Sum, "total"),
        )
        .sort(SortCriterion::desc("total"))
}

fn handler_with(uuid: &str, amounts: &[f64]) -> DataSetHandler {
    let registry = Arc::new(DataSetRegistry::default());
    registry.register(expenses(uuid, amounts));
    DataSetHandler::new(registry)
}

#[test]
fn unknown_uuid_is_not_found() {
    init_logging();
    let handler = DataSetHandler::new(Arc::new(DataSetRegistry::default()));
    let err = handler.lookup(&DataSetLookup::new("missing")).unwrap_err();
    assert_eq!(err, ApiError::NotFound("missing".into()));
    assert_eq!(err.status_code(), 404);
    assert!(matches!(handler.metadata("missing"), Err(ApiError::NotFound(_))));
}

#[test]
fn grouped_lookup_end_to_end() {
    init_logging();
    let handler = handler_with("e", &[10.0, 20.0, 30.0, 40.0]);
    let out = handler.lookup(&totals_by_department("e")).unwrap();
    assert_eq!(labels(&out, "department"), vec!["Engineering", "Support", "Sales"]);
    assert_eq!(numbers(&out, "total"), vec![50.0, 30.0, 20.0]);
}

#[test]
fn repeated_lookup_is_served_from_cache() {
    let handler = handler_with("e", &[10.0, 20.0, 30.0]);
    let lookup = totals_by_department("e");
    let first = handler.lookup(&lookup).unwrap();
    let second = handler.lookup(&lookup).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let stats = handler.registry().entry("e").unwrap().results().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.computations, 1);
}

#[test]
fn equivalent_filters_share_a_cache_entry() {
    let handler = handler_with("e", &[10.0, 20.0, 30.0, 40.0]);
    let a = DataSetLookup::new("e").filter(FilterNode::and(vec![
        FilterNode::greater_than("amount", 15.0),
        FilterNode::equals_to("department", "Engineering"),
    ]));
    let b = DataSetLookup::new("e").filter(FilterNode::and(vec![
        FilterNode::equals_to("department", "Engineering"),
        FilterNode::greater_than("amount", 15.0),
    ]));
    let first = handler.lookup(&a).unwrap();
    let second = handler.lookup(&b).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(numbers(&first, "amount"), vec![40.0]);
}

#[test]
fn replacement_makes_old_results_unreachable() {
    let registry = Arc::new(DataSetRegistry::default());
    registry.register(expenses("e", &[10.0, 20.0]));
    let handler = DataSetHandler::new(registry.clone());
    let lookup = DataSetLookup::new("e").select(["amount"]);

    let before = handler.lookup(&lookup).unwrap();
    assert_eq!(numbers(&before, "amount"), vec![10.0, 20.0]);

    registry.register(expenses("e", &[1.0, 2.0, 3.0]));
    let after = handler.lookup(&lookup).unwrap();
    assert_eq!(numbers(&after, "amount"), vec![1.0, 2.0, 3.0]);

    let fresh = registry.entry("e").unwrap();
    assert_eq!(fresh.results().stats().hits, 0);
    assert_eq!(fresh.results().stats().computations, 1);
}

#[test]
fn in_flight_lookup_completes_against_its_instance() {
    let registry = Arc::new(DataSetRegistry::default());
    registry.register(expenses("e", &[10.0, 20.0]));
    let handler = DataSetHandler::new(registry.clone());

    // a lookup that resolved the old instance before the swap
    let held = registry.entry("e").unwrap();
    registry.register(expenses("e", &[99.0]));

    let out = handler
        .lookup_on(&held, &DataSetLookup::new("e").select(["amount"]))
        .unwrap();
    assert_eq!(numbers(&out, "amount"), vec![10.0, 20.0]);
    assert_eq!(registry.get("e").unwrap().row_count(), 1);
}

#[test]
fn concurrent_identical_lookups_compute_once() {
    let amounts: Vec<f64> = (0..20_000).map(|i| (i % 97) as f64).collect();
    let handler = Arc::new(handler_with("big", &amounts));
    let lookup = totals_by_department("big");
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let results: Vec<_> = (0..threads)
        .map(|_| {
            let handler = handler.clone();
            let lookup = lookup.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                handler.lookup(&lookup).unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect();

    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    let stats = handler.registry().entry("big").unwrap().results().stats();
    assert_eq!(stats.computations, 1);
}

#[test]
fn failed_lookup_is_not_cached() {
    let handler = handler_with("e", &[10.0]);
    let bad = DataSetLookup::new("e").filter(FilterNode::equals_to("nope", 1.0));
    for _ in 0..2 {
        let err = handler.lookup(&bad).unwrap_err();
        assert_eq!(err, ApiError::InvalidRequest("Unknown column: nope".into()));
    }
    let entry = handler.registry().entry("e").unwrap();
    assert!(entry.results().is_empty());
    assert_eq!(entry.results().stats().computations, 2);
}

#[test]
fn aggregate_type_error_surfaces() {
    let handler = handler_with("e", &[10.0]);
    let lookup = DataSetLookup::new("e").group(
        GroupOp::new().aggregate("department", AggregateFunction::Sum, "total"),
    );
    let err = handler.lookup(&lookup).unwrap_err();
    assert!(matches!(err, ApiError::TypeError(_)), "{err:?}");
}

#[test]
fn time_frame_lookups_bypass_the_cache() {
    let registry = Arc::new(DataSetRegistry::default());
    registry.register(
        DataSetBuilder::new("events")
            .date("at")
            .row(vec![parse_date("2024-05-01").into()])
            .row(vec![parse_date("2020-01-01").into()])
            .row(vec![Value::Null])
            .build()
            .unwrap(),
    );
    let handler = DataSetHandler::new(registry)
        .with_options(QueryOptions::default().with_now(parse_date("2024-06-01").unwrap()));
    let lookup = DataSetLookup::new("events").filter(FilterNode::time_frame("at", "last 1 year"));

    let first = handler.lookup(&lookup).unwrap();
    let second = handler.lookup(&lookup).unwrap();
    assert_eq!(first.row_count(), 1);
    assert!(!Arc::ptr_eq(&first, &second));

    let entry = handler.registry().entry("events").unwrap();
    assert!(entry.results().is_empty());
}

#[test]
fn metadata_describes_registered_dataset() {
    let handler = handler_with("e", &[1.0, 2.0]);
    let meta = handler.metadata("e").unwrap();
    assert_eq!(meta.uuid, "e");
    assert_eq!(meta.row_count, 2);
    assert_eq!(meta.column_ids, vec!["department", "amount"]);
}

#[test]
fn decoded_request_shares_cache_with_built_lookup() {
    let handler = handler_with("e", &[10.0, 20.0, 30.0, 40.0]);
    let decoded: DataSetLookup = serde_json::from_str(
        r#"{
            "dataset_uuid": "e",
            "filter": {"op": "PREDICATE", "column_id": "AMOUNT", "function": "GREATER_THAN", "args": [15]},
            "sort_ops": [{"column_id": "amount", "order": "DESC"}]
        }"#,
    )
    .unwrap();
    let built = DataSetLookup::new("e")
        .filter(FilterNode::greater_than("amount", 15.0))
        .sort(SortCriterion::desc("amount"));

    let first = handler.lookup(&decoded).unwrap();
    let second = handler.lookup(&built).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(numbers(&first, "amount"), vec![40.0, 30.0, 20.0]);
}
