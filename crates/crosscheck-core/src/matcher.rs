//! Response matcher.
//!
//! Compares an actual (status, JSON body) pair against a step's
//! expectation. Body comparison is set-equality-up-to-key-subset: the
//! expected and actual record sequences must have equal length and admit a
//! bijection where every expected key is present in the paired actual
//! record with an equal value. Extra actual keys never fail, which lets one
//! fixture validate engines with differing but compatible schemas.
//!
//! Pairing is order-insensitive and multiset-aware: duplicate expected
//! records must each find a distinct actual partner. The matcher searches
//! for a maximum bipartite matching (Kuhn's augmenting paths) rather than
//! pairing greedily, so any valid pairing is found regardless of input
//! order.

use crate::scenario::{ExpectedRecord, Expectation, StatusExpectation};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A response that did not satisfy a step's expectation.
#[derive(Debug, Clone, Error)]
pub enum MismatchError {
    /// The status code check failed.
    #[error("expected status {expected}, got {actual}")]
    Status { expected: String, actual: u16 },

    /// A body was expected but the response is not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    BodyNotJson(String),

    /// The record sequences have different lengths.
    #[error("expected {expected} records, got {actual}")]
    RecordCount { expected: usize, actual: usize },

    /// No valid pairing between expected and actual records exists.
    #[error("{0}")]
    Records(RecordDiff),

    /// An `expected_ordered` sequence failed at a specific position.
    #[error("record {index} mismatch:{}", render_field_diffs(.fields))]
    OrderedRecord { index: usize, fields: Vec<FieldDiff> },
}

/// One differing field between an expected and an actual record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub key: String,
    pub expected: Value,
    /// `None` when the key is absent from the actual record.
    pub actual: Option<Value>,
}

/// Diagnostics for a failed unordered pairing: which expected records found
/// no partner, and which actual records were left over.
#[derive(Debug, Clone, Default)]
pub struct RecordDiff {
    pub unmatched_expected: Vec<Value>,
    pub unmatched_actual: Vec<Value>,
    /// Field-level detail, populated when exactly one record of each side
    /// is unmatched and the culprit fields are unambiguous.
    pub fields: Vec<FieldDiff>,
}

fn render_field_diffs(fields: &[FieldDiff]) -> String {
    let mut out = String::new();
    for diff in fields {
        match &diff.actual {
            Some(actual) => {
                out.push_str(&format!(
                    "\n  field {:?}: expected {}, got {}",
                    diff.key, diff.expected, actual
                ));
            }
            None => {
                out.push_str(&format!(
                    "\n  field {:?}: expected {}, missing from actual record",
                    diff.key, diff.expected
                ));
            }
        }
    }
    out
}

impl fmt::Display for RecordDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no valid pairing between expected and actual records"
        )?;
        for record in &self.unmatched_expected {
            write!(f, "\nexpected record found no match: {record}")?;
        }
        for record in &self.unmatched_actual {
            write!(f, "\nactual record unmatched (surplus): {record}")?;
        }
        write!(f, "{}", render_field_diffs(&self.fields))
    }
}

/// Validates a response against a step's status and body expectations.
///
/// The body is only examined when an expectation is present and the status
/// check passed; status-only steps never decode the payload.
pub fn check_response(
    status: StatusExpectation,
    expected: Option<&Expectation>,
    actual_status: u16,
    actual_body: &[u8],
) -> Result<(), MismatchError> {
    if !status.accepts(actual_status) {
        return Err(MismatchError::Status {
            expected: status.to_string(),
            actual: actual_status,
        });
    }

    let Some(expectation) = expected else {
        return Ok(());
    };

    let body: Value = serde_json::from_slice(actual_body).map_err(|e| {
        MismatchError::BodyNotJson(format!(
            "{e} (body: {})",
            String::from_utf8_lossy(&actual_body[..actual_body.len().min(200)])
        ))
    })?;

    // The common case is a list-of-records response; a single object is
    // treated as a one-record sequence.
    let records: Vec<Value> = match body {
        Value::Array(items) => items,
        other => vec![other],
    };

    match expectation {
        Expectation::Unordered(expected_records) => {
            check_unordered(expected_records, &records)
        }
        Expectation::Ordered(expected_records) => check_ordered(expected_records, &records),
    }
}

fn check_ordered(expected: &[ExpectedRecord], actual: &[Value]) -> Result<(), MismatchError> {
    if expected.len() != actual.len() {
        return Err(MismatchError::RecordCount {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    for (index, (record, value)) in expected.iter().zip(actual).enumerate() {
        if !record_matches(record, value) {
            return Err(MismatchError::OrderedRecord {
                index,
                fields: field_diffs(record, value),
            });
        }
    }

    Ok(())
}

fn check_unordered(expected: &[ExpectedRecord], actual: &[Value]) -> Result<(), MismatchError> {
    if expected.len() != actual.len() {
        return Err(MismatchError::RecordCount {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    // compat[i] holds the actual indices record i may pair with.
    let compat: Vec<Vec<usize>> = expected
        .iter()
        .map(|record| {
            actual
                .iter()
                .enumerate()
                .filter(|(_, value)| record_matches(record, value))
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let assignment = maximum_matching(&compat, actual.len());
    let matched = assignment.iter().filter(|a| a.is_some()).count();
    if matched == expected.len() {
        return Ok(());
    }

    let mut used = vec![false; actual.len()];
    for slot in assignment.iter().flatten() {
        used[*slot] = true;
    }

    let unmatched_expected: Vec<usize> = assignment
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_none())
        .map(|(i, _)| i)
        .collect();
    let unmatched_actual: Vec<usize> = (0..actual.len()).filter(|j| !used[*j]).collect();

    let fields = if let ([i], [j]) = (unmatched_expected.as_slice(), unmatched_actual.as_slice()) {
        field_diffs(&expected[*i], &actual[*j])
    } else {
        Vec::new()
    };

    Err(MismatchError::Records(RecordDiff {
        unmatched_expected: unmatched_expected
            .iter()
            .map(|i| expected[*i].to_value())
            .collect(),
        unmatched_actual: unmatched_actual.iter().map(|j| actual[*j].clone()).collect(),
        fields,
    }))
}

/// Kuhn's augmenting-path maximum bipartite matching. Returns, per expected
/// index, the actual index it was assigned (or `None`).
fn maximum_matching(compat: &[Vec<usize>], actual_len: usize) -> Vec<Option<usize>> {
    // owner[j] = expected index currently holding actual j.
    let mut owner: Vec<Option<usize>> = vec![None; actual_len];

    fn try_assign(
        i: usize,
        compat: &[Vec<usize>],
        owner: &mut [Option<usize>],
        visited: &mut [bool],
    ) -> bool {
        for &j in &compat[i] {
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let displaced = owner[j];
            if displaced.is_none_or(|current| try_assign(current, compat, owner, visited)) {
                owner[j] = Some(i);
                return true;
            }
        }
        false
    }

    for i in 0..compat.len() {
        let mut visited = vec![false; actual_len];
        try_assign(i, compat, &mut owner, &mut visited);
    }

    let mut assignment = vec![None; compat.len()];
    for (j, slot) in owner.iter().enumerate() {
        if let Some(i) = *slot {
            assignment[i] = Some(j);
        }
    }
    assignment
}

/// Whether every expected key is present in the actual record with an equal
/// value. Extra actual keys are ignored.
fn record_matches(expected: &ExpectedRecord, actual: &Value) -> bool {
    let Some(object) = actual.as_object() else {
        return false;
    };
    expected
        .fields
        .iter()
        .all(|(key, value)| object.get(key).is_some_and(|a| values_match(value, a)))
}

/// Structural value comparison.
///
/// Objects compare by recursive key-subset, arrays element-wise with equal
/// length, scalars exactly - except that an expected string declaring a
/// numeric value matches an equal actual number (`"100"` vs `100`). The
/// coercion is one-directional: an expected number never matches an actual
/// string.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => e
            .iter()
            .all(|(key, value)| a.get(key).is_some_and(|av| values_match(value, av))),
        (Value::Array(e), Value::Array(a)) => {
            e.len() == a.len() && e.iter().zip(a).all(|(ev, av)| values_match(ev, av))
        }
        (Value::String(e), Value::Number(a)) => {
            e.trim().parse::<f64>().is_ok_and(|parsed| {
                a.as_f64().is_some_and(|actual_num| parsed == actual_num)
            })
        }
        _ => expected == actual,
    }
}

/// Per-field differences between an expected record and an actual value.
fn field_diffs(expected: &ExpectedRecord, actual: &Value) -> Vec<FieldDiff> {
    let Some(object) = actual.as_object() else {
        return vec![FieldDiff {
            key: "<record>".to_string(),
            expected: expected.to_value(),
            actual: Some(actual.clone()),
        }];
    };

    expected
        .fields
        .iter()
        .filter_map(|(key, value)| match object.get(key) {
            Some(actual_value) if values_match(value, actual_value) => None,
            Some(actual_value) => Some(FieldDiff {
                key: key.clone(),
                expected: value.clone(),
                actual: Some(actual_value.clone()),
            }),
            None => Some(FieldDiff {
                key: key.clone(),
                expected: value.clone(),
                actual: None,
            }),
        })
        .collect()
}
