//! # crosscheck
//!
//! Command-line conformance runner for search-engine HTTP APIs.
//!
//! Replays declarative scenario fixtures against one or more configured
//! target engines and reports whether every response satisfied its
//! expectation.
//!
//! ## Usage
//!
//! ```bash
//! # Run a scenario against two engines
//! crosscheck --engine quickwit=http://127.0.0.1:7280/api/v1 \
//!            --engine elasticsearch=http://127.0.0.1:9200 \
//!            fixtures/gharchive.yaml
//!
//! # Engines from the environment
//! CROSSCHECK_ENGINES=quickwit=http://127.0.0.1:7280/api/v1 crosscheck fixtures/gharchive.yaml
//!
//! # Inspect a fixture without executing it
//! crosscheck --list fixtures/gharchive.yaml
//! ```

mod reporter;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use crosscheck_core::{Dispatcher, EngineSet, ReqwestClient, RunnerConfig, Scenario};
use reporter::{TerminalReporter, Verbosity};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Declarative cross-engine HTTP conformance runner.
///
/// Validates that multiple search-engine HTTP APIs behave identically for
/// a shared surface of endpoints, as described by scenario fixture files.
#[derive(Parser, Debug)]
#[command(name = "crosscheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario files to run, in order
    #[arg(required = true, value_name = "SCENARIO")]
    scenarios: Vec<PathBuf>,

    /// Target engine as name=url (repeatable); defaults to CROSSCHECK_ENGINES
    #[arg(long = "engine", value_name = "NAME=URL")]
    engines: Vec<String>,

    /// Transport-level timeout per request attempt, in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Fixed delay between retry attempts, in milliseconds
    #[arg(long, default_value_t = 500)]
    backoff_ms: u64,

    /// List parsed steps without executing them
    #[arg(long)]
    list: bool,

    /// Show detailed output including retry counts and diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Only show pass/fail summaries
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    match rt.block_on(run(&cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("{} {:#}", "Error:".red().bold(), error);
            std::process::exit(2);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    // Parse every scenario up front: a malformed fixture aborts the whole
    // run before anything touches the target engines.
    let mut scenarios = Vec::new();
    for path in &cli.scenarios {
        let scenario = Scenario::load(path)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        tracing::debug!(scenario = %scenario.name, steps = scenario.steps.len(), "parsed");
        scenarios.push(scenario);
    }

    if cli.list {
        for scenario in &scenarios {
            list_steps(scenario);
        }
        return Ok(true);
    }

    let engines = if cli.engines.is_empty() {
        EngineSet::from_env()?.context(
            "no target engines configured; pass --engine name=url or set CROSSCHECK_ENGINES",
        )?
    } else {
        EngineSet::from_specs(&cli.engines)?
    };

    let config = RunnerConfig::new()
        .with_request_timeout(Duration::from_secs(cli.timeout_secs))
        .with_retry_backoff(Duration::from_millis(cli.backoff_ms));

    let client = ReqwestClient::new(config.request_timeout)?;
    let verbosity = cli.verbosity();
    let reporter = TerminalReporter::new(verbosity);

    let dispatcher = Dispatcher::new(engines, Arc::new(client))
        .with_config(config)
        .on_progress(reporter.progress_callback());

    let mut all_passed = true;
    for scenario in &scenarios {
        let report = dispatcher
            .run(scenario)
            .await
            .with_context(|| format!("run configuration rejected for {}", scenario.name))?;

        if !report.all_passed() {
            all_passed = false;
            if verbosity != Verbosity::Quiet {
                reporter.print_failures(&report);
            }
        }
        reporter.print_summary(&report);
    }

    Ok(all_passed)
}

fn list_steps(scenario: &Scenario) {
    println!("\n{}", scenario.name.bold());
    for (index, step) in scenario.steps.iter().enumerate() {
        let methods: Vec<&str> = step.methods.iter().map(|m| m.as_str()).collect();
        let engines = step
            .engines
            .as_ref()
            .map(|declared| {
                declared
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "all engines".to_string());

        println!(
            "  {:>3}  {} {}  {}",
            index,
            methods.join("|").cyan(),
            step.endpoint,
            format!("[{engines}]").dimmed()
        );
        if let Some(description) = &step.description {
            println!("       {}", description.dimmed());
        }
    }
    println!(
        "\n  {}",
        format!(
            "Total: {} step{}",
            scenario.steps.len(),
            if scenario.steps.len() == 1 { "" } else { "s" }
        )
        .dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_engines_and_scenarios() {
        let cli = Cli::parse_from([
            "crosscheck",
            "--engine",
            "quickwit=http://127.0.0.1:7280/api/v1",
            "--engine",
            "elasticsearch=http://127.0.0.1:9200",
            "fixtures/gharchive.yaml",
        ]);
        assert_eq!(cli.engines.len(), 2);
        assert_eq!(cli.scenarios.len(), 1);
        assert_eq!(cli.timeout_secs, 10);
        assert_eq!(cli.backoff_ms, 500);
        assert_eq!(cli.verbosity(), Verbosity::Normal);
    }

    #[test]
    fn test_cli_requires_a_scenario() {
        assert!(Cli::try_parse_from(["crosscheck"]).is_err());
    }

    #[test]
    fn test_cli_verbosity_tiers() {
        let quiet = Cli::parse_from(["crosscheck", "-q", "s.yaml"]);
        assert_eq!(quiet.verbosity(), Verbosity::Quiet);

        let verbose = Cli::parse_from(["crosscheck", "-v", "s.yaml"]);
        assert_eq!(verbose.verbosity(), Verbosity::Verbose);
    }
}
