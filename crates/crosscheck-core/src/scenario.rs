//! Scenario document model and parser.
//!
//! A scenario file is a UTF-8 stream of YAML documents separated by `---`
//! lines. Each document describes one [`Step`]: a declarative HTTP request
//! plus the expectation its response must satisfy. Parsing is fail-fast:
//! unknown fields, conflicting body sources, and inconsistent expectations
//! are rejected with the offending document index so fixture typos surface
//! immediately instead of silently passing.
//!
//! The parser performs no cross-step resolution. Carrying `api_root` forward
//! from one step to the next is execution-time state owned by the
//! dispatcher, not a parse-time transform.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors produced while parsing a scenario file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid YAML or does not match the step schema.
    #[error("document {index}: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    /// A document is structurally valid but violates a step invariant.
    #[error("document {index}: {message}")]
    Invalid { index: usize, message: String },

    /// The file contained no step documents.
    #[error("scenario contains no steps")]
    Empty,
}

/// HTTP verbs a step may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
    Patch,
    Options,
}

impl Method {
    /// Returns the wire-format verb name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a step's request body comes from. At most one source per step.
#[derive(Debug, Clone, PartialEq)]
pub enum BodySource {
    /// Inline JSON value, sent compact as `application/json`.
    Json(Value),
    /// Inline record sequence, serialized as newline-delimited JSON.
    Ndjson(Vec<Value>),
    /// External payload file, resolved relative to the scenario file.
    FromFile(PathBuf),
}

/// What the response status must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusExpectation {
    /// No `status_code` declared: any 2xx is acceptable.
    Success,
    /// `status_code: <n>`: the status must equal `n` exactly.
    Exact(u16),
    /// `status_code: null`: any status at all, including failures.
    /// Used for idempotent pre-cleanup steps.
    Any,
}

impl StatusExpectation {
    /// Whether `actual` satisfies this expectation.
    pub fn accepts(&self, actual: u16) -> bool {
        match self {
            StatusExpectation::Success => (200..300).contains(&actual),
            StatusExpectation::Exact(code) => actual == *code,
            StatusExpectation::Any => true,
        }
    }
}

impl fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusExpectation::Success => write!(f, "2xx"),
            StatusExpectation::Exact(code) => write!(f, "{code}"),
            StatusExpectation::Any => write!(f, "any"),
        }
    }
}

/// One expected response record, with comment-disabled keys already
/// stripped into an explicit ignored list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpectedRecord {
    /// Keys that must be present in the paired actual record with equal
    /// values. Extra actual keys never fail the comparison.
    pub fields: serde_json::Map<String, Value>,
    /// Keys that were `#`-prefixed in the fixture. Never evaluated, kept
    /// only so diagnostics can show what was deliberately excluded.
    pub ignored: Vec<String>,
}

impl ExpectedRecord {
    /// Renders the checked fields as a JSON value for diagnostics.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// A step's body expectation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// `expected`: order-insensitive multiset of records. The matcher must
    /// find a bijection between expected and actual sequences.
    Unordered(Vec<ExpectedRecord>),
    /// `expected_ordered`: positional record sequence.
    Ordered(Vec<ExpectedRecord>),
}

impl Expectation {
    /// The expected records regardless of ordering semantics.
    pub fn records(&self) -> &[ExpectedRecord] {
        match self {
            Expectation::Unordered(records) | Expectation::Ordered(records) => records,
        }
    }
}

/// One declared request/expectation unit within a scenario.
#[derive(Debug, Clone)]
pub struct Step {
    /// Free-text comment, no behavioral effect.
    pub description: Option<String>,
    /// Verbs to run this step with, one execution per verb.
    pub methods: Vec<Method>,
    /// Base-URL override that becomes the effective default for this and
    /// all subsequent steps. Resolved by the dispatcher at execution time.
    pub api_root: Option<String>,
    /// Path, possibly carrying its own query string.
    pub endpoint: String,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Extra query parameters merged into the endpoint.
    pub params: BTreeMap<String, String>,
    /// Request body source, if any.
    pub body: Option<BodySource>,
    /// Additional attempts after the first (total attempts = retries + 1).
    pub num_retries: u32,
    /// Settle delay after a successful execution.
    pub sleep_after: Duration,
    /// Engines this step applies to; `None` means all configured engines.
    pub engines: Option<BTreeSet<String>>,
    /// Expected response status.
    pub status: StatusExpectation,
    /// Expected response body, if the body is validated at all.
    pub expected: Option<Expectation>,
}

/// An ordered, immutable sequence of steps parsed from one fixture file.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Display name, normally the source file path.
    pub name: String,
    /// Directory external body payloads are resolved against.
    pub base_dir: PathBuf,
    /// The steps, in declaration order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Loads and parses a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::parse(&path.display().to_string(), &base_dir, &text)
    }

    /// Parses scenario text. `name` is used for diagnostics and `base_dir`
    /// anchors `body_from_file` references.
    pub fn parse(name: &str, base_dir: &Path, text: &str) -> Result<Self, ParseError> {
        let mut steps = Vec::new();

        for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let value = serde_yaml::Value::deserialize(document)
                .map_err(|source| ParseError::Yaml { index, source })?;

            // A trailing `---` or a comment-only document parses as null.
            if value.is_null() {
                continue;
            }

            let raw: RawStep = serde_yaml::from_value(value)
                .map_err(|source| ParseError::Yaml { index, source })?;
            steps.push(raw.into_step(index)?);
        }

        if steps.is_empty() {
            return Err(ParseError::Empty);
        }

        Ok(Self {
            name: name.to_string(),
            base_dir: base_dir.to_path_buf(),
            steps,
        })
    }
}

/// `method` accepts a single verb or a list of verbs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MethodSpec {
    One(Method),
    Many(Vec<Method>),
}

impl MethodSpec {
    fn into_vec(self) -> Vec<Method> {
        match self {
            MethodSpec::One(method) => vec![method],
            MethodSpec::Many(methods) => methods,
        }
    }
}

/// Distinguishes an absent `status_code` from an explicit `null`.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<u16>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u16>::deserialize(deserializer).map(Some)
}

/// Raw on-disk step shape. Unknown fields are rejected so fixture typos
/// fail the parse instead of being silently ignored.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    description: Option<String>,
    method: Option<MethodSpec>,
    api_root: Option<String>,
    endpoint: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    params: BTreeMap<String, String>,
    json: Option<Value>,
    ndjson: Option<Vec<Value>>,
    body_from_file: Option<String>,
    #[serde(default)]
    num_retries: u32,
    #[serde(default)]
    sleep_after: f64,
    engines: Option<BTreeSet<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    status_code: Option<Option<u16>>,
    expected: Option<Vec<Value>>,
    expected_ordered: Option<Vec<Value>>,
}

impl RawStep {
    fn into_step(self, index: usize) -> Result<Step, ParseError> {
        let invalid = |message: String| ParseError::Invalid { index, message };

        let endpoint = self
            .endpoint
            .ok_or_else(|| invalid("missing required field `endpoint`".to_string()))?;

        let methods = self
            .method
            .ok_or_else(|| invalid("missing required field `method`".to_string()))?
            .into_vec();
        if methods.is_empty() {
            return Err(invalid("`method` list must not be empty".to_string()));
        }

        let mut body_sources = Vec::new();
        if let Some(json) = self.json {
            body_sources.push(BodySource::Json(json));
        }
        if let Some(records) = self.ndjson {
            body_sources.push(BodySource::Ndjson(records));
        }
        if let Some(path) = self.body_from_file {
            body_sources.push(BodySource::FromFile(PathBuf::from(path)));
        }
        if body_sources.len() > 1 {
            return Err(invalid(
                "only one of `json`, `ndjson`, `body_from_file` may be set".to_string(),
            ));
        }
        let body = body_sources.pop();

        if self.sleep_after < 0.0 {
            return Err(invalid(format!(
                "`sleep_after` must be non-negative, got {}",
                self.sleep_after
            )));
        }

        let status = match self.status_code {
            None => StatusExpectation::Success,
            Some(None) => StatusExpectation::Any,
            Some(Some(code)) => StatusExpectation::Exact(code),
        };

        let expected = match (self.expected, self.expected_ordered) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "only one of `expected`, `expected_ordered` may be set".to_string(),
                ));
            }
            (Some(records), None) => Some(Expectation::Unordered(parse_expected_records(
                records, index,
            )?)),
            (None, Some(records)) => {
                Some(Expectation::Ordered(parse_expected_records(records, index)?))
            }
            (None, None) => None,
        };

        // A step cannot expect a body while also tolerating a failure status.
        if expected.is_some() {
            match status {
                StatusExpectation::Exact(code) if !(200..300).contains(&code) => {
                    return Err(invalid(format!(
                        "`expected` requires a success status, got `status_code: {code}`"
                    )));
                }
                StatusExpectation::Any => {
                    return Err(invalid(
                        "`expected` cannot be combined with `status_code: null`".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(Step {
            description: self.description,
            methods,
            api_root: self.api_root,
            endpoint,
            headers: self.headers,
            params: self.params,
            body,
            num_retries: self.num_retries,
            sleep_after: Duration::from_secs_f64(self.sleep_after),
            engines: self.engines,
            status,
            expected,
        })
    }
}

/// Converts raw expected values into [`ExpectedRecord`]s, lifting
/// `#`-prefixed keys out of the comparison into the ignored list.
fn parse_expected_records(
    records: Vec<Value>,
    index: usize,
) -> Result<Vec<ExpectedRecord>, ParseError> {
    records
        .into_iter()
        .enumerate()
        .map(|(record_index, value)| {
            let Value::Object(object) = value else {
                return Err(ParseError::Invalid {
                    index,
                    message: format!("expected record {record_index} is not a JSON object"),
                });
            };

            let mut fields = serde_json::Map::new();
            let mut ignored = Vec::new();
            for (key, field_value) in object {
                if let Some(stripped) = key.strip_prefix('#') {
                    ignored.push(stripped.trim().to_string());
                } else {
                    fields.insert(key, field_value);
                }
            }

            // A key that is both declared and comment-disabled is ambiguous;
            // the disable wins, matching the fixture author's stated intent.
            for name in &ignored {
                if fields.remove(name).is_some() {
                    warn!(
                        document = index,
                        record = record_index,
                        key = %name,
                        "expected record declares a key both plainly and #-disabled; ignoring it"
                    );
                }
            }

            Ok(ExpectedRecord { fields, ignored })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Result<Scenario, ParseError> {
        Scenario::parse("test.yaml", Path::new("."), text)
    }

    #[test]
    fn test_parse_minimal_step() {
        let scenario = parse("method: GET\nendpoint: _cat/indices\n").unwrap();
        assert_eq!(scenario.steps.len(), 1);

        let step = &scenario.steps[0];
        assert_eq!(step.methods, vec![Method::Get]);
        assert_eq!(step.endpoint, "_cat/indices");
        assert_eq!(step.status, StatusExpectation::Success);
        assert!(step.body.is_none());
        assert!(step.expected.is_none());
        assert_eq!(step.num_retries, 0);
        assert_eq!(step.sleep_after, Duration::ZERO);
    }

    #[test]
    fn test_parse_multi_document() {
        let text = "\
method: PUT
endpoint: indexes
json:
  index_id: gharchive
---
method: GET
endpoint: _cat/indices
";
        let scenario = parse(text).unwrap();
        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.steps[0].methods, vec![Method::Put]);
        assert_eq!(scenario.steps[1].methods, vec![Method::Get]);
    }

    #[test]
    fn test_parse_method_list() {
        let scenario = parse("method: [GET, POST]\nendpoint: search\n").unwrap();
        assert_eq!(scenario.steps[0].methods, vec![Method::Get, Method::Post]);
    }

    #[test]
    fn test_parse_trailing_delimiter_and_comments() {
        let text = "\
# fixture header comment
method: DELETE
endpoint: indexes/gharchive
status_code: null
---
";
        let scenario = parse(text).unwrap();
        assert_eq!(scenario.steps.len(), 1);
    }

    #[test]
    fn test_status_code_states() {
        let absent = parse("method: GET\nendpoint: a\n").unwrap();
        assert_eq!(absent.steps[0].status, StatusExpectation::Success);

        let null = parse("method: GET\nendpoint: a\nstatus_code: null\n").unwrap();
        assert_eq!(null.steps[0].status, StatusExpectation::Any);

        let exact = parse("method: GET\nendpoint: a\nstatus_code: 404\n").unwrap();
        assert_eq!(exact.steps[0].status, StatusExpectation::Exact(404));
    }

    #[test]
    fn test_status_expectation_accepts() {
        assert!(StatusExpectation::Success.accepts(204));
        assert!(!StatusExpectation::Success.accepts(404));
        assert!(StatusExpectation::Exact(404).accepts(404));
        assert!(!StatusExpectation::Exact(404).accepts(200));
        assert!(StatusExpectation::Any.accepts(500));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("method: GET\nendpoint: a\nexpectedd: []\n").unwrap_err();
        assert!(matches!(err, ParseError::Yaml { index: 0, .. }), "{err}");
    }

    #[test]
    fn test_error_carries_document_index() {
        let text = "\
method: GET
endpoint: ok
---
method: GET
";
        let err = parse(text).unwrap_err();
        match err {
            ParseError::Invalid { index, ref message } => {
                assert_eq!(index, 1);
                assert!(message.contains("endpoint"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_method_rejected() {
        let err = parse("endpoint: a\n").unwrap_err();
        match err {
            ParseError::Invalid { ref message, .. } => {
                assert!(message.contains("method"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflicting_body_sources_rejected() {
        let text = "\
method: POST
endpoint: ingest
json: {a: 1}
ndjson:
  - {b: 2}
";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_expected_with_failure_status_rejected() {
        let text = "\
method: GET
endpoint: a
status_code: 404
expected:
  - index: gharchive
";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_expected_with_any_status_rejected() {
        let text = "\
method: GET
endpoint: a
status_code: null
expected:
  - index: gharchive
";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_both_expectation_kinds_rejected() {
        let text = "\
method: GET
endpoint: a
expected:
  - {a: 1}
expected_ordered:
  - {a: 1}
";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_negative_sleep_rejected() {
        let err = parse("method: GET\nendpoint: a\nsleep_after: -1\n").unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_commented_keys_stripped_into_ignored_list() {
        let text = "\
method: GET
endpoint: _cat/indices
expected:
  - index: gharchive
    \"docs.count\": \"100\"
    \"#uuid\": 01H8
";
        let scenario = parse(text).unwrap();
        let Some(Expectation::Unordered(records)) = &scenario.steps[0].expected else {
            panic!("expected unordered expectation");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ignored, vec!["uuid".to_string()]);
        assert!(!records[0].fields.contains_key("uuid"));
        assert!(!records[0].fields.contains_key("#uuid"));
        assert_eq!(records[0].fields["docs.count"], json!("100"));
    }

    #[test]
    fn test_ambiguous_commented_key_disable_wins() {
        let text = "\
method: GET
endpoint: a
expected:
  - uuid: literal
    \"#uuid\": disabled
";
        let scenario = parse(text).unwrap();
        let records = scenario.steps[0].expected.as_ref().unwrap().records();
        assert!(!records[0].fields.contains_key("uuid"));
        assert_eq!(records[0].ignored, vec!["uuid".to_string()]);
    }

    #[test]
    fn test_non_object_expected_record_rejected() {
        let text = "\
method: GET
endpoint: a
expected:
  - 42
";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ParseError::Invalid { .. }), "{err}");
    }

    #[test]
    fn test_full_step_fields() {
        let text = "\
description: bulk ingest
method: POST
api_root: api/v1
endpoint: \"{engine}/_bulk\"
headers:
  content-encoding: gzip
params:
  refresh: \"true\"
ndjson:
  - {create: {_index: gharchive}}
  - {id: 1}
num_retries: 3
sleep_after: 0.5
engines: [quickwit]
status_code: 200
";
        let scenario = parse(text).unwrap();
        let step = &scenario.steps[0];
        assert_eq!(step.description.as_deref(), Some("bulk ingest"));
        assert_eq!(step.api_root.as_deref(), Some("api/v1"));
        assert_eq!(step.num_retries, 3);
        assert_eq!(step.sleep_after, Duration::from_millis(500));
        assert_eq!(step.params["refresh"], "true");
        assert_eq!(step.headers["content-encoding"], "gzip");
        assert!(step.engines.as_ref().unwrap().contains("quickwit"));
        assert_eq!(step.status, StatusExpectation::Exact(200));
        match &step.body {
            Some(BodySource::Ndjson(records)) => assert_eq!(records.len(), 2),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_api_root_not_resolved_at_parse_time() {
        let text = "\
method: GET
api_root: api/v1
endpoint: a
---
method: GET
endpoint: b
";
        let scenario = parse(text).unwrap();
        // Carry-forward is the dispatcher's job; the second step stays bare.
        assert_eq!(scenario.steps[0].api_root.as_deref(), Some("api/v1"));
        assert!(scenario.steps[1].api_root.is_none());
    }

    #[test]
    fn test_empty_scenario_rejected() {
        assert!(matches!(parse("---\n"), Err(ParseError::Empty)));
    }
}
