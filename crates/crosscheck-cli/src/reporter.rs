//! Terminal reporting for conformance runs.
//!
//! Renders incremental progress while a scenario executes and a final
//! summary with failure diagnostics once the report is in.

use colored::Colorize;
use crosscheck_core::{Outcome, ProgressCallback, ProgressEvent, RunReport};

/// Verbosity level for terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Show only pass/fail summary.
    Quiet,
    /// Normal output with per-step progress.
    #[default]
    Normal,
    /// Detailed output including retry counts and skip reasons.
    Verbose,
}

/// Terminal reporter for conformance run results.
#[derive(Debug, Clone, Copy)]
pub struct TerminalReporter {
    verbosity: Verbosity,
}

impl TerminalReporter {
    /// Creates a reporter with the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Builds a progress callback printing incremental step results.
    pub fn progress_callback(self) -> ProgressCallback {
        Box::new(move |event| self.handle_progress(&event))
    }

    fn handle_progress(self, event: &ProgressEvent) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }

        match event {
            ProgressEvent::RunStarted {
                scenario,
                engines,
                total_executions,
            } => {
                println!(
                    "\n{} {}",
                    scenario.bold(),
                    format!(
                        "({} execution{} across {})",
                        total_executions,
                        if *total_executions == 1 { "" } else { "s" },
                        engines.join(", ")
                    )
                    .dimmed()
                );
            }
            ProgressEvent::StepCompleted {
                step,
                engine,
                method,
                passed,
                attempts,
                failure,
            } => {
                let mark = if *passed { "✅" } else { "❌" };
                let retries = if *attempts > 1 && self.verbosity == Verbosity::Verbose {
                    format!(" ({attempts} attempts)").dimmed().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} step {} {} {}{}",
                    mark,
                    step,
                    method,
                    format!("[{engine}]").cyan(),
                    retries
                );
                if let Some(message) = failure {
                    if self.verbosity == Verbosity::Verbose {
                        for line in message.lines() {
                            println!("       {}", line.red());
                        }
                    }
                }
            }
            ProgressEvent::LaneAborted {
                engine,
                failed_step,
            } => {
                println!(
                    "  {}",
                    format!("⏭️  [{engine}] aborting after step {failed_step} failure").yellow()
                );
            }
            ProgressEvent::RunCompleted { .. } => {}
        }
    }

    /// Prints every failure with its diagnostics.
    pub fn print_failures(&self, report: &RunReport) {
        let failures = report.failures();
        if failures.is_empty() {
            return;
        }

        println!("\n{}", "Failures:".red().bold());
        for outcome in failures {
            println!("\n  {}", outcome.label().bold());
            if let Some(description) = &outcome.description {
                println!("  {}", description.dimmed());
            }
            if let Outcome::Failed(cause) = &outcome.outcome {
                for line in cause.to_string().lines() {
                    println!("    {}", line.red());
                }
            }
        }
    }

    /// Prints the final summary for one scenario run.
    pub fn print_summary(&self, report: &RunReport) {
        if self.verbosity == Verbosity::Quiet {
            let line = format!(
                "{} {}/{} passed",
                report.scenario,
                report.passed_count(),
                report.total_count()
            );
            if report.all_passed() {
                println!("{}", format!("✓ {line}").green());
            } else {
                println!("{}", format!("✗ {line}").red());
            }
            return;
        }

        println!("{}", "━".repeat(40).dimmed());

        let verdict = if report.all_passed() {
            format!("✅ {} passed", report.scenario).green().bold()
        } else {
            format!("❌ {} failed", report.scenario).red().bold()
        };
        println!("{verdict}");

        for (engine, outcomes) in report.by_engine() {
            let passed = outcomes.iter().filter(|o| o.passed()).count();
            let skipped = outcomes.iter().filter(|o| o.skipped()).count();
            let mut line = format!("  {engine}: {passed}/{} passed", outcomes.len());
            if skipped > 0 {
                line.push_str(&format!(", {skipped} skipped"));
            }
            println!("{}", line.dimmed());
        }

        println!(
            "{}",
            format!("  completed in {:.1}s", report.duration.as_secs_f64()).dimmed()
        );
    }
}
