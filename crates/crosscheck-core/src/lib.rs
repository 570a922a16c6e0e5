//! # crosscheck-core
//!
//! Core engine for crosscheck: a declarative cross-engine HTTP conformance
//! runner. Scenario fixture files describe ordered request/expectation
//! steps; the engine replays them against one or more configured targets
//! (e.g. a Quickwit-like engine next to an Elasticsearch-like engine) and
//! compares the responses structurally.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌─────────┐    ┌─────────┐
//! │ Scenario │───▶│ Dispatcher │───▶│ Request │───▶│  Retry  │
//! │  Parser  │    │ (per-lane) │    │ Builder │    │ Control │
//! └──────────┘    └────────────┘    └─────────┘    └─────────┘
//!                       │                               │
//!                       ▼                               ▼
//!                 ┌──────────┐                   ┌────────────┐
//!                 │  Report  │◀──────────────────│  Matcher   │
//!                 └──────────┘                   └────────────┘
//! ```
//!
//! One execution lane per configured engine; steps run strictly in order
//! within a lane and lanes run concurrently. The only externally consumed
//! entry point is [`Dispatcher::run`], which returns a [`RunReport`].
//!
//! # Example
//!
//! ```no_run
//! use crosscheck_core::{Dispatcher, EngineSet, ReqwestClient, RunnerConfig, Scenario};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scenario = Scenario::load("fixtures/gharchive.yaml").unwrap();
//!     let engines = EngineSet::from_specs(&[
//!         "quickwit=http://127.0.0.1:7280/api/v1",
//!         "elasticsearch=http://127.0.0.1:9200",
//!     ])
//!     .unwrap();
//!
//!     let config = RunnerConfig::default();
//!     let client = ReqwestClient::new(config.request_timeout).unwrap();
//!     let dispatcher = Dispatcher::new(engines, Arc::new(client)).with_config(config);
//!
//!     let report = dispatcher.run(&scenario).await.unwrap();
//!     println!("passed: {}/{}", report.passed_count(), report.total_count());
//! }
//! ```

pub use crate::config::{ConfigurationError, Engine, EngineSet, RunnerConfig, ENGINES_ENV_VAR};
pub use crate::dispatch::{Dispatcher, ProgressCallback, ProgressEvent};
pub use crate::http::{HttpClient, HttpResponse, ReqwestClient, TransportError};
pub use crate::matcher::{FieldDiff, MismatchError, RecordDiff, check_response};
pub use crate::report::{Outcome, RunReport, StepFailure, StepOutcome};
pub use crate::request::{BuildError, BuiltRequest, build_request, resolve_base, serialize_ndjson};
pub use crate::retry::{RetryController, RetryOutcome};
pub use crate::scenario::{
    BodySource, Expectation, ExpectedRecord, Method, ParseError, Scenario, StatusExpectation, Step,
};
pub use crate::testing::MockHttpClient;

pub mod config;
pub mod dispatch;
pub mod http;
pub mod matcher;
pub mod report;
pub mod request;
pub mod retry;
pub mod scenario;
pub mod testing;

/// Library version, matching the crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
