//! Request builder.
//!
//! Turns a step's declarative request fields into a concrete request
//! against a resolved base URL: absolute URL with merged query parameters,
//! header map with the implicit content-type for the body source, and the
//! body payload bytes.
//!
//! For `ndjson` bodies every record is serialized as one line of compact
//! JSON, newline-joined with a single trailing newline - the bulk-ingest
//! wire format both target engines require. File-backed payloads ending in
//! `.gz` are gunzipped client-side unless the step declares
//! `content-encoding: gzip`, in which case the compressed bytes pass
//! through unmodified and the engine decompresses server-side.

use crate::scenario::{BodySource, Method, Step};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while assembling a request. These abort only the affected
/// (step, engine) execution.
#[derive(Debug, Error)]
pub enum BuildError {
    /// `body_from_file` could not be read.
    #[error("failed to read body file {path}: {source}")]
    BodyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A gzip payload could not be decompressed.
    #[error("failed to decompress {path}: {source}")]
    Gunzip {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An inline body could not be serialized.
    #[error("failed to serialize {kind} body: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A fully-formed request, ready for the HTTP collaborator.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: Method,
    /// Absolute URL including the merged query string.
    pub url: String,
    /// Declared headers plus the implicit content-type, declaration order.
    pub headers: Vec<(String, String)>,
    /// Body payload; empty means no body.
    pub body: Vec<u8>,
}

/// Resolves the effective base URL for a step.
///
/// An absolute `api_root` replaces the engine base URL entirely; a relative
/// one is joined onto it. Without an `api_root` the engine base URL is used
/// as-is.
pub fn resolve_base(engine_base: &str, api_root: Option<&str>) -> String {
    match api_root {
        None => engine_base.trim_end_matches('/').to_string(),
        Some(root) if root.starts_with("http://") || root.starts_with("https://") => {
            root.trim_end_matches('/').to_string()
        }
        Some(root) => format!(
            "{}/{}",
            engine_base.trim_end_matches('/'),
            root.trim_matches('/')
        ),
    }
}

/// Builds the concrete request for one (step, engine, method) execution.
///
/// `base_url` is the already-resolved effective base (see [`resolve_base`]);
/// `engine_id` is substituted for the `{engine}` placeholder in the
/// endpoint; `base_dir` anchors `body_from_file` references.
pub fn build_request(
    step: &Step,
    method: Method,
    base_url: &str,
    engine_id: &str,
    base_dir: &Path,
) -> Result<BuiltRequest, BuildError> {
    let endpoint = step.endpoint.replace("{engine}", engine_id);
    let mut url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );

    // Query params are appended verbatim so wildcard and comma-list values
    // reach the engine untouched.
    for (name, value) in &step.params {
        let separator = if url.contains('?') { '&' } else { '?' };
        url.push(separator);
        url.push_str(name);
        url.push('=');
        url.push_str(value);
    }

    let mut headers: Vec<(String, String)> = step
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let body = match &step.body {
        None => Vec::new(),
        Some(BodySource::Json(value)) => {
            add_default_content_type(&mut headers, "application/json");
            serde_json::to_vec(value).map_err(|source| BuildError::Serialize {
                kind: "json",
                source,
            })?
        }
        Some(BodySource::Ndjson(records)) => {
            add_default_content_type(&mut headers, "application/x-ndjson");
            serialize_ndjson(records)?
        }
        Some(BodySource::FromFile(path)) => load_body_file(path, base_dir, &headers)?,
    };

    Ok(BuiltRequest {
        method,
        url,
        headers,
        body,
    })
}

/// Serializes records as newline-delimited compact JSON with a single
/// trailing newline.
pub fn serialize_ndjson(records: &[serde_json::Value]) -> Result<Vec<u8>, BuildError> {
    let mut body = Vec::new();
    for record in records {
        let line = serde_json::to_vec(record).map_err(|source| BuildError::Serialize {
            kind: "ndjson",
            source,
        })?;
        body.extend_from_slice(&line);
        body.push(b'\n');
    }
    Ok(body)
}

fn add_default_content_type(headers: &mut Vec<(String, String)>, content_type: &str) {
    let declared = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !declared {
        headers.push(("content-type".to_string(), content_type.to_string()));
    }
}

fn declares_gzip_encoding(headers: &[(String, String)]) -> bool {
    headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("content-encoding") && value.eq_ignore_ascii_case("gzip")
    })
}

fn load_body_file(
    path: &Path,
    base_dir: &Path,
    headers: &[(String, String)],
) -> Result<Vec<u8>, BuildError> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    let bytes = std::fs::read(&resolved).map_err(|source| BuildError::BodyFile {
        path: resolved.clone(),
        source,
    })?;

    let gz = resolved
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

    // With a declared content-encoding the engine decompresses server-side;
    // the compressed bytes must pass through untouched.
    if gz && !declares_gzip_encoding(headers) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| BuildError::Gunzip {
                path: resolved,
                source,
            })?;
        return Ok(decoded);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::{Value, json};
    use std::io::Write;

    fn step_from(text: &str) -> Step {
        Scenario::parse("test.yaml", Path::new("."), text).unwrap().steps[0].clone()
    }

    fn build(step: &Step, base: &str) -> BuiltRequest {
        build_request(step, step.methods[0], base, "quickwit", Path::new(".")).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let step = step_from("method: GET\nendpoint: _cat/indices\n");
        let request = build(&step, "http://127.0.0.1:7280/api/v1/");
        assert_eq!(request.url, "http://127.0.0.1:7280/api/v1/_cat/indices");
    }

    #[test]
    fn test_leading_slash_endpoint() {
        let step = step_from("method: GET\nendpoint: /indexes\n");
        let request = build(&step, "http://localhost:9200");
        assert_eq!(request.url, "http://localhost:9200/indexes");
    }

    #[test]
    fn test_params_appended_to_plain_endpoint() {
        let step = step_from("method: GET\nendpoint: _cat/indices\nparams:\n  format: json\n");
        let request = build(&step, "http://localhost:9200");
        assert_eq!(request.url, "http://localhost:9200/_cat/indices?format=json");
    }

    #[test]
    fn test_params_merged_with_existing_query() {
        let step = step_from(
            "method: GET\nendpoint: \"_cat/indices?index=gh*\"\nparams:\n  format: json\n",
        );
        let request = build(&step, "http://localhost:9200");
        assert_eq!(
            request.url,
            "http://localhost:9200/_cat/indices?index=gh*&format=json"
        );
    }

    #[test]
    fn test_engine_placeholder_substitution() {
        let step = step_from("method: POST\nendpoint: \"{engine}/_bulk\"\n");
        let request = build(&step, "http://localhost:9200");
        assert_eq!(request.url, "http://localhost:9200/quickwit/_bulk");
    }

    #[test]
    fn test_resolve_base_variants() {
        assert_eq!(
            resolve_base("http://localhost:9200/", None),
            "http://localhost:9200"
        );
        assert_eq!(
            resolve_base("http://localhost:7280", Some("api/v1")),
            "http://localhost:7280/api/v1"
        );
        assert_eq!(
            resolve_base("http://localhost:7280", Some("http://other:9999/root/")),
            "http://other:9999/root"
        );
    }

    #[test]
    fn test_json_body_and_implicit_content_type() {
        let step = step_from("method: PUT\nendpoint: indexes\njson:\n  index_id: gharchive\n");
        let request = build(&step, "http://localhost:7280");
        assert_eq!(request.body, br#"{"index_id":"gharchive"}"#);
        assert!(
            request
                .headers
                .contains(&("content-type".to_string(), "application/json".to_string()))
        );
    }

    #[test]
    fn test_declared_content_type_not_overridden() {
        let step = step_from(
            "method: PUT\nendpoint: indexes\nheaders:\n  Content-Type: application/yaml\njson: {}\n",
        );
        let request = build(&step, "http://localhost:7280");
        let content_types: Vec<_> = request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(content_types[0].1, "application/yaml");
    }

    #[test]
    fn test_ndjson_wire_format() {
        let records = vec![json!({"create": {}}), json!({"id": 1, "name": "a"})];
        let body = serialize_ndjson(&records).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.ends_with('\n'));
        assert!(!text.ends_with("\n\n"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_ndjson_round_trip() {
        let records = vec![
            json!({"create": {"_index": "gharchive"}}),
            json!({"id": 1, "type": "PushEvent"}),
            json!({"id": 2, "type": "WatchEvent"}),
        ];
        let body = serialize_ndjson(&records).unwrap();

        let decoded: Vec<Value> = String::from_utf8(body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_ndjson_content_type() {
        let step = step_from("method: POST\nendpoint: _bulk\nndjson:\n  - {a: 1}\n");
        let request = build(&step, "http://localhost:9200");
        assert!(
            request
                .headers
                .contains(&("content-type".to_string(), "application/x-ndjson".to_string()))
        );
    }

    #[test]
    fn test_body_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("payload.ndjson"), b"{\"id\":1}\n").unwrap();

        let step = step_from("method: POST\nendpoint: _bulk\nbody_from_file: payload.ndjson\n");
        let request =
            build_request(&step, Method::Post, "http://localhost:9200", "es", dir.path()).unwrap();
        assert_eq!(request.body, b"{\"id\":1}\n");
    }

    #[test]
    fn test_missing_body_file_is_build_error() {
        let step = step_from("method: POST\nendpoint: _bulk\nbody_from_file: missing.ndjson\n");
        let err = build_request(&step, Method::Post, "http://x", "es", Path::new("/nonexistent"))
            .unwrap_err();
        assert!(matches!(err, BuildError::BodyFile { .. }), "{err}");
    }

    #[test]
    fn test_gz_file_decompressed_client_side() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"id\":1}\n").unwrap();
        let compressed = encoder.finish().unwrap();
        std::fs::write(dir.path().join("payload.ndjson.gz"), &compressed).unwrap();

        let step = step_from("method: POST\nendpoint: _bulk\nbody_from_file: payload.ndjson.gz\n");
        let request =
            build_request(&step, Method::Post, "http://localhost:9200", "es", dir.path()).unwrap();
        assert_eq!(request.body, b"{\"id\":1}\n");
    }

    #[test]
    fn test_gz_file_passthrough_with_declared_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"id\":1}\n").unwrap();
        let compressed = encoder.finish().unwrap();
        std::fs::write(dir.path().join("payload.ndjson.gz"), &compressed).unwrap();

        let step = step_from(
            "method: POST\nendpoint: _bulk\nheaders:\n  content-encoding: gzip\nbody_from_file: payload.ndjson.gz\n",
        );
        let request =
            build_request(&step, Method::Post, "http://localhost:9200", "es", dir.path()).unwrap();
        assert_eq!(request.body, compressed);
    }
}
