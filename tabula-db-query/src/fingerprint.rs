//! Lookup fingerprints
//!
//! A fingerprint is a 128-bit xxh3 hash of a normalized encoding of the
//! lookup, so requests that differ only in ways that cannot change the
//! result hash identically:
//!
//! - column ids are compared case-insensitively
//! - nested AND / OR nodes are flattened and their children sorted
//! - single-child AND / OR collapse to the child
//! - IN / NOT_IN arguments and selected intervals are sorted and deduplicated
//!
//! Order-sensitive parts (group ops, grouping columns, sort criteria,
//! selected columns) are encoded in order.

use crate::lookup::{ColumnGroup, CoreFunction, DataSetLookup, FilterNode, GroupOp};
use std::fmt;
use tabula_db_core::Value;
use xxhash_rust::xxh3::xxh3_128;

/// Normalized hash of a [`DataSetLookup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u128);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl DataSetLookup {
    pub fn fingerprint(&self) -> Fingerprint {
        let mut enc = Encoder::default();
        enc.str(&self.dataset_uuid);
        match &self.filter {
            None => enc.tag(0),
            Some(node) => {
                enc.tag(1);
                let bytes = encode_filter(&normalize(node));
                enc.bytes(&bytes);
            }
        }
        enc.len(self.group_ops.len());
        for op in &self.group_ops {
            encode_group_op(&mut enc, op);
        }
        enc.len(self.sort_ops.len());
        for s in &self.sort_ops {
            enc.id(&s.column_id);
            enc.tag(s.order as u8);
        }
        match &self.selected_columns {
            None => enc.tag(0),
            Some(cols) => {
                enc.tag(1);
                enc.len(cols.len());
                for c in cols {
                    enc.id(c);
                }
            }
        }
        enc.len(self.row_offset);
        match self.row_count {
            None => enc.tag(0),
            Some(n) => {
                enc.tag(1);
                enc.len(n);
            }
        }
        Fingerprint(xxh3_128(&enc.buf))
    }
}

/// Length-prefixed, type-tagged byte encoding
#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn tag(&mut self, t: u8) {
        self.buf.push(t);
    }

    fn len(&mut self, n: usize) {
        self.buf.extend_from_slice(&(n as u64).to_le_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.len(b.len());
        self.buf.extend_from_slice(b);
    }

    fn str(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    /// Column ids are case-insensitive
    fn id(&mut self, s: &str) {
        self.str(&s.to_lowercase());
    }

    fn value(&mut self, v: &Value) {
        let mut out = Vec::new();
        v.write_canonical(&mut |b| out.extend_from_slice(b));
        self.bytes(&out);
    }
}

/// Canonical form of a filter tree
fn normalize(node: &FilterNode) -> FilterNode {
    match node {
        FilterNode::Predicate {
            column_id,
            function,
            args,
        } => {
            let mut args = args.clone();
            if matches!(function, CoreFunction::In | CoreFunction::NotIn) {
                args.sort();
                args.dedup();
            }
            FilterNode::Predicate {
                column_id: column_id.to_lowercase(),
                function: *function,
                args,
            }
        }
        FilterNode::And { children } => {
            let mut flat = Vec::new();
            flatten(children, &mut flat, and_children);
            collapse(flat, FilterNode::and)
        }
        FilterNode::Or { children } => {
            let mut flat = Vec::new();
            flatten(children, &mut flat, or_children);
            collapse(flat, FilterNode::or)
        }
        FilterNode::Not { children } => {
            let mut normalized: Vec<FilterNode> = children.iter().map(normalize).collect();
            sort_children(&mut normalized);
            FilterNode::not(normalized)
        }
    }
}

fn and_children(node: &FilterNode) -> Option<&Vec<FilterNode>> {
    match node {
        FilterNode::And { children } => Some(children),
        _ => None,
    }
}

fn or_children(node: &FilterNode) -> Option<&Vec<FilterNode>> {
    match node {
        FilterNode::Or { children } => Some(children),
        _ => None,
    }
}

fn flatten(
    children: &[FilterNode],
    out: &mut Vec<FilterNode>,
    same_kind: fn(&FilterNode) -> Option<&Vec<FilterNode>>,
) {
    for child in children {
        let normalized = normalize(child);
        match same_kind(&normalized) {
            Some(grandchildren) => out.extend(grandchildren.iter().cloned()),
            None => out.push(normalized),
        }
    }
}

fn collapse(mut children: Vec<FilterNode>, make: fn(Vec<FilterNode>) -> FilterNode) -> FilterNode {
    sort_children(&mut children);
    children.dedup();
    if children.len() == 1 {
        children.remove(0)
    } else {
        make(children)
    }
}

fn sort_children(children: &mut [FilterNode]) {
    children.sort_by_cached_key(encode_filter);
}

fn encode_filter(node: &FilterNode) -> Vec<u8> {
    let mut enc = Encoder::default();
    write_filter(&mut enc, node);
    enc.buf
}

fn write_filter(enc: &mut Encoder, node: &FilterNode) {
    let (tag, children) = match node {
        FilterNode::Predicate {
            column_id,
            function,
            args,
        } => {
            enc.tag(b'P');
            enc.id(column_id);
            enc.str(function.name());
            enc.len(args.len());
            for a in args {
                enc.value(a);
            }
            return;
        }
        FilterNode::And { children } => (b'A', children),
        FilterNode::Or { children } => (b'O', children),
        FilterNode::Not { children } => (b'N', children),
    };
    enc.tag(tag);
    enc.len(children.len());
    for c in children {
        write_filter(enc, c);
    }
}

fn encode_group_op(enc: &mut Encoder, op: &GroupOp) {
    enc.len(op.group_columns.len());
    for g in &op.group_columns {
        encode_column_group(enc, g);
    }
    enc.len(op.agg_columns.len());
    for a in &op.agg_columns {
        enc.id(&a.source_column_id);
        enc.str(a.function.name());
        enc.id(&a.result_column_id);
    }
    let mut selected: Vec<&str> = op.selected_intervals.iter().map(String::as_str).collect();
    selected.sort_unstable();
    selected.dedup();
    enc.len(selected.len());
    for s in selected {
        enc.str(s);
    }
}

fn encode_column_group(enc: &mut Encoder, g: &ColumnGroup) {
    enc.id(&g.column_id);
    enc.id(g.result_id());
    enc.tag(g.strategy as u8);
    match g.interval_type {
        None => enc.tag(0),
        Some(t) => {
            enc.tag(1);
            enc.str(t.name());
        }
    }
    enc.len(g.max_intervals);
    enc.tag(u8::from(g.empty_intervals));
    enc.tag(u8::from(g.ascending));
    enc.tag(g.first_month_of_year.number_from_month() as u8);
    enc.tag(g.first_day_of_week.num_days_from_monday() as u8);
}
