//! Shared fixtures for the lookup integration tests, plus a tracing layer
//! that records span names and fields so tests can assert on pipeline
//! instrumentation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tabula_db_core::{parse_date, DataSet, DataSetBuilder, Value};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// department(LABEL), amount(NUMBER), city(LABEL)
pub fn expenses() -> DataSet {
    DataSetBuilder::new("expenses")
        .label("department")
        .number("amount")
        .label("city")
        .row(vec!["Engineering".into(), 100.into(), "BCN".into()])
        .row(vec!["Engineering".into(), 200.into(), "BCN".into()])
        .row(vec!["Sales".into(), 50.into(), "MAD".into()])
        .row(vec!["Engineering".into(), 300.into(), "MAD".into()])
        .build()
        .unwrap()
}

/// Sales spread over 2019-2021, with one missing date
pub fn sales() -> DataSet {
    let rows = [
        ("2019-01-15 10:00:00", 10.0, "BCN"),
        ("2019-03-02 11:30:00", 20.0, "MAD"),
        ("2020-01-20 09:15:00", 30.0, "BCN"),
        ("2020-07-04 18:00:00", 40.0, "BCN"),
        ("2021-03-30 08:45:00", 50.0, "MAD"),
        ("2021-12-24 20:00:00", 60.0, "LON"),
    ];
    let mut builder = DataSetBuilder::new("sales").date("date").number("amount").label("city");
    for (date, amount, city) in rows {
        builder = builder.row(vec![parse_date(date).into(), amount.into(), city.into()]);
    }
    builder
        .row(vec![Value::Null, 70.into(), "LON".into()])
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpanStore(Arc<Mutex<Vec<(Id, CapturedSpan)>>>);

impl SpanStore {
    pub fn span_names(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|(_, s)| s.name).collect()
    }

    pub fn find_span(&self, name: &str) -> Option<CapturedSpan> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(_, s)| s.clone())
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

pub struct SpanCaptureLayer {
    store: SpanStore,
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        let captured = CapturedSpan {
            name: attrs.metadata().name(),
            fields,
        };
        self.store.0.lock().unwrap().push((id.clone(), captured));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut spans = self.store.0.lock().unwrap();
        if let Some((_, span)) = spans.iter_mut().rev().find(|(sid, _)| sid == id) {
            values.record(&mut FieldVisitor(&mut span.fields));
        }
    }
}

/// Install a span-capturing subscriber for the current thread
pub fn init_test_tracing() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;
    let store = SpanStore::default();
    let layer = SpanCaptureLayer {
        store: store.clone(),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}
