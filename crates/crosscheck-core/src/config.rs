//! Runner configuration: the configured engine set and tuning constants.
//!
//! Engine targets are supplied externally (CLI flags or environment), never
//! parsed from scenario files. Identifiers are free-form tags; a step's
//! `engines` field filters against them by intersection.

use std::time::Duration;
use thiserror::Error;

/// Environment variable holding comma-separated `name=url` engine pairs.
pub const ENGINES_ENV_VAR: &str = "CROSSCHECK_ENGINES";

/// Errors in the run configuration, fatal before execution starts.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// No engines were configured at all.
    #[error("no target engines configured; pass --engine name=url or set {ENGINES_ENV_VAR}")]
    NoEngines,

    /// An engine spec string is not of the form `name=url`.
    #[error("invalid engine spec {0:?}: expected name=url")]
    InvalidSpec(String),

    /// The same engine identifier was configured twice.
    #[error("engine {0:?} configured more than once")]
    DuplicateEngine(String),

    /// A step references an engine identifier outside the configured set.
    #[error("step {step} references unknown engine {engine:?} (configured: {configured:?})")]
    UnknownEngine {
        step: usize,
        engine: String,
        configured: Vec<String>,
    },

    /// A step declares an empty engine set, so it would never run anywhere.
    #[error("step {step} declares an empty `engines` set")]
    EmptyEngines { step: usize },
}

/// One configured HTTP target implementing the API under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    /// Identifier steps filter on (e.g. `quickwit`, `elasticsearch`).
    pub id: String,
    /// Base URL requests are issued against.
    pub base_url: String,
}

/// The configured engine set, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct EngineSet {
    engines: Vec<Engine>,
}

impl EngineSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an engine, builder-style.
    pub fn with_engine(
        mut self,
        id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let id = id.into();
        if self.contains(&id) {
            return Err(ConfigurationError::DuplicateEngine(id));
        }
        self.engines.push(Engine {
            id,
            base_url: base_url.into(),
        });
        Ok(self)
    }

    /// Parses `name=url` spec strings, as passed on the command line.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, ConfigurationError> {
        let mut set = Self::new();
        for spec in specs {
            let spec = spec.as_ref().trim();
            let (name, url) = spec
                .split_once('=')
                .filter(|(name, url)| !name.is_empty() && !url.is_empty())
                .ok_or_else(|| ConfigurationError::InvalidSpec(spec.to_string()))?;
            set = set.with_engine(name.trim(), url.trim())?;
        }
        if set.is_empty() {
            return Err(ConfigurationError::NoEngines);
        }
        Ok(set)
    }

    /// Reads the engine set from [`ENGINES_ENV_VAR`]. Returns `None` when
    /// the variable is unset.
    pub fn from_env() -> Result<Option<Self>, ConfigurationError> {
        match std::env::var(ENGINES_ENV_VAR) {
            Ok(value) => {
                let specs: Vec<&str> = value.split(',').map(str::trim).collect();
                Self::from_specs(&specs).map(Some)
            }
            Err(_) => Ok(None),
        }
    }

    /// Whether `id` names a configured engine.
    pub fn contains(&self, id: &str) -> bool {
        self.engines.iter().any(|engine| engine.id == id)
    }

    /// Configured identifiers, declaration order.
    pub fn ids(&self) -> Vec<String> {
        self.engines.iter().map(|engine| engine.id.clone()).collect()
    }

    /// Iterates the configured engines.
    pub fn iter(&self) -> impl Iterator<Item = &Engine> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Tuning constants for request execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Transport-level timeout per request attempt.
    pub request_timeout: Duration,
    /// Fixed delay between retry attempts.
    pub retry_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the fixed retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}
