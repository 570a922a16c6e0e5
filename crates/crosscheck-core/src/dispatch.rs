//! Engine dispatcher.
//!
//! Owns the configured engine set and drives scenario execution: one
//! logical lane per engine, steps strictly sequential within a lane (later
//! steps assume the side effects of earlier ones), lanes concurrent across
//! engines (isolated targets, no shared state).
//!
//! Per-lane execution state lives in the lane itself: the effective
//! `api_root` carries forward in scenario order, and a failed step whose
//! status expectation is not `Any` aborts the lane's remaining steps
//! without cancelling other lanes, so a run always reports a complete
//! picture for engines whose earlier steps succeeded.

use crate::config::{ConfigurationError, Engine, EngineSet, RunnerConfig};
use crate::http::HttpClient;
use crate::matcher::check_response;
use crate::report::{Outcome, RunReport, StepFailure, StepOutcome};
use crate::request::{build_request, resolve_base};
use crate::retry::RetryController;
use crate::scenario::{Method, Scenario, StatusExpectation, Step};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Progress callback for incremental reporting.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a scenario runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Execution is about to start.
    RunStarted {
        scenario: String,
        engines: Vec<String>,
        total_executions: usize,
    },

    /// One (step, engine, method) execution finished.
    StepCompleted {
        step: usize,
        engine: String,
        method: Method,
        passed: bool,
        attempts: u32,
        failure: Option<String>,
    },

    /// A lane hit a fatal step failure and will skip its remaining steps.
    LaneAborted { engine: String, failed_step: usize },

    /// The whole run finished.
    RunCompleted {
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Runs scenarios against the configured engine set.
pub struct Dispatcher {
    engines: EngineSet,
    client: Arc<dyn HttpClient>,
    config: RunnerConfig,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given engines and HTTP collaborator.
    pub fn new(engines: EngineSet, client: Arc<dyn HttpClient>) -> Self {
        Self {
            engines,
            client,
            config: RunnerConfig::default(),
            on_progress: None,
        }
    }

    /// Replaces the runner tuning constants.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a callback for progress updates.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Runs one scenario across all configured engines and returns the
    /// aggregated report.
    ///
    /// Configuration problems (no engines, a step referencing an engine
    /// outside the configured set) are fatal and surface before any request
    /// is sent; execution-time failures are recovered per (step, engine)
    /// and recorded in the report instead.
    pub async fn run(&self, scenario: &Scenario) -> Result<RunReport, ConfigurationError> {
        self.validate(scenario)?;

        let started_at = Utc::now();
        let started = Instant::now();

        let total_executions: usize = scenario
            .steps
            .iter()
            .map(|step| self.applicable_engines(step) * step.methods.len())
            .sum();

        self.emit(ProgressEvent::RunStarted {
            scenario: scenario.name.clone(),
            engines: self.engines.ids(),
            total_executions,
        });

        info!(
            scenario = %scenario.name,
            engines = ?self.engines.ids(),
            steps = scenario.steps.len(),
            "starting conformance run"
        );

        let scenario = Arc::new(scenario.clone());
        let mut ids = Vec::new();
        let mut lanes = Vec::new();
        for engine in self.engines.iter().cloned() {
            let scenario = Arc::clone(&scenario);
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let progress = self.on_progress.clone();
            ids.push(engine.id.clone());
            lanes.push(tokio::spawn(async move {
                run_lane(scenario, engine, client, config, progress).await
            }));
        }

        let mut outcomes = Vec::new();
        for (id, joined) in ids.into_iter().zip(join_all(lanes).await) {
            match joined {
                Ok(lane_outcomes) => outcomes.extend(lane_outcomes),
                Err(join_error) => {
                    error!(engine = %id, %join_error, "engine lane panicked");
                }
            }
        }

        let report = RunReport {
            scenario: scenario.name.clone(),
            started_at,
            duration: started.elapsed(),
            outcomes,
        };

        self.emit(ProgressEvent::RunCompleted {
            passed: report.passed_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
        });

        Ok(report)
    }

    /// Checks every step's engine references against the configured set.
    fn validate(&self, scenario: &Scenario) -> Result<(), ConfigurationError> {
        if self.engines.is_empty() {
            return Err(ConfigurationError::NoEngines);
        }

        for (index, step) in scenario.steps.iter().enumerate() {
            let Some(declared) = &step.engines else {
                continue;
            };
            if declared.is_empty() {
                return Err(ConfigurationError::EmptyEngines { step: index });
            }
            for id in declared {
                if !self.engines.contains(id) {
                    return Err(ConfigurationError::UnknownEngine {
                        step: index,
                        engine: id.clone(),
                        configured: self.engines.ids(),
                    });
                }
            }
        }

        Ok(())
    }

    fn applicable_engines(&self, step: &Step) -> usize {
        match &step.engines {
            None => self.engines.len(),
            Some(declared) => declared.len(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

fn emit(progress: &Option<Arc<ProgressCallback>>, event: ProgressEvent) {
    if let Some(callback) = progress {
        callback(event);
    }
}

/// Executes every applicable step of `scenario` against one engine,
/// strictly in order.
async fn run_lane(
    scenario: Arc<Scenario>,
    engine: Engine,
    client: Arc<dyn HttpClient>,
    config: RunnerConfig,
    progress: Option<Arc<ProgressCallback>>,
) -> Vec<StepOutcome> {
    let controller = RetryController::new(config.retry_backoff);
    let mut outcomes = Vec::new();
    let mut api_root: Option<String> = None;
    let mut aborted_at: Option<usize> = None;

    debug!(engine = %engine.id, "lane started");

    for (index, step) in scenario.steps.iter().enumerate() {
        // api_root is declarative context, not an execution side effect: it
        // carries forward in scenario order even when this step is filtered
        // out for this engine or the lane has already aborted.
        if let Some(root) = &step.api_root {
            api_root = Some(root.clone());
        }

        let applicable = step
            .engines
            .as_ref()
            .is_none_or(|declared| declared.contains(&engine.id));
        if !applicable {
            continue;
        }

        if let Some(failed_step) = aborted_at {
            let reason = format!("lane aborted after step {failed_step} failed");
            for method in &step.methods {
                outcomes.push(skipped_outcome(index, step, &engine, *method, &reason));
            }
            continue;
        }

        let base = resolve_base(&engine.base_url, api_root.as_deref());

        for (position, method) in step.methods.iter().enumerate() {
            let started = Instant::now();
            let (outcome, attempts) = execute_once(
                step,
                *method,
                &base,
                &engine,
                &scenario.base_dir,
                client.as_ref(),
                &controller,
            )
            .await;

            let failed = matches!(outcome, Outcome::Failed(_));
            let failure = match &outcome {
                Outcome::Failed(cause) => Some(cause.to_string()),
                _ => None,
            };

            emit(
                &progress,
                ProgressEvent::StepCompleted {
                    step: index,
                    engine: engine.id.clone(),
                    method: *method,
                    passed: !failed,
                    attempts,
                    failure,
                },
            );

            outcomes.push(StepOutcome {
                step: index,
                description: step.description.clone(),
                engine: engine.id.clone(),
                method: *method,
                endpoint: step.endpoint.clone(),
                attempts,
                duration: started.elapsed(),
                outcome,
            });

            // Fail-fast per lane: later steps assume this one's side
            // effects. Steps tolerating any status never abort.
            if failed && step.status != StatusExpectation::Any {
                aborted_at = Some(index);
                emit(
                    &progress,
                    ProgressEvent::LaneAborted {
                        engine: engine.id.clone(),
                        failed_step: index,
                    },
                );

                let reason = format!("lane aborted after step {index} failed");
                for remaining in &step.methods[position + 1..] {
                    outcomes.push(skipped_outcome(index, step, &engine, *remaining, &reason));
                }
                break;
            }
        }
    }

    debug!(engine = %engine.id, outcomes = outcomes.len(), "lane finished");
    outcomes
}

/// Builds, sends (with retries), and matches one execution.
async fn execute_once(
    step: &Step,
    method: Method,
    base: &str,
    engine: &Engine,
    base_dir: &std::path::Path,
    client: &dyn HttpClient,
    controller: &RetryController,
) -> (Outcome, u32) {
    let request = match build_request(step, method, base, &engine.id, base_dir) {
        Ok(request) => request,
        Err(build_error) => return (Outcome::Failed(StepFailure::Build(build_error)), 0),
    };

    let retried = controller
        .execute(client, &request, step.status, step.num_retries, step.sleep_after)
        .await;

    let outcome = match retried.result {
        Err(transport) => Outcome::Failed(StepFailure::Transport(transport)),
        Ok(response) => {
            match check_response(
                step.status,
                step.expected.as_ref(),
                response.status,
                &response.body,
            ) {
                Ok(()) => Outcome::Passed,
                Err(mismatch) => Outcome::Failed(StepFailure::Mismatch(mismatch)),
            }
        }
    };

    (outcome, retried.attempts)
}

fn skipped_outcome(
    index: usize,
    step: &Step,
    engine: &Engine,
    method: Method,
    reason: &str,
) -> StepOutcome {
    StepOutcome {
        step: index,
        description: step.description.clone(),
        engine: engine.id.clone(),
        method,
        endpoint: step.endpoint.clone(),
        attempts: 0,
        duration: std::time::Duration::ZERO,
        outcome: Outcome::Skipped {
            reason: reason.to_string(),
        },
    }
}
