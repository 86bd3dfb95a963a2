use super::{EventSink, ReporterError};
use crate::logging::Verbosity;
use crate::models::{OutcomeStatus, TestOutcome};
use crate::runner::{RunEvent, RunResults};
use colored::Colorize;
use std::time::Duration;

/// Terminal reporter for run progress and results.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    verbosity: Verbosity,
    current_suite: Option<String>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            current_suite: None,
        }
    }

    fn status_mark(status: OutcomeStatus) -> colored::ColoredString {
        match status {
            OutcomeStatus::Passed => "✓".green(),
            OutcomeStatus::Failed => "✗".red(),
            OutcomeStatus::ExpectedFailure => "x".yellow(),
            OutcomeStatus::Skipped => "-".dimmed(),
        }
    }

    fn seconds(duration: Duration) -> String {
        format!("({:.1}s)", duration.as_secs_f64())
    }

    /// One progress line for a finished test.
    pub fn render_outcome(&self, outcome: &TestOutcome) -> String {
        let mut line = format!(
            "  {} {} {}",
            Self::status_mark(outcome.status),
            outcome.test_id,
            Self::seconds(outcome.duration).dimmed()
        );
        match outcome.status {
            OutcomeStatus::ExpectedFailure => {
                let defect = outcome.defect_id.as_deref().unwrap_or("known defect");
                line.push_str(&format!(" {}", format!("[expected: {defect}]").yellow()));
            }
            OutcomeStatus::Skipped => {
                if let Some(reason) = &outcome.message {
                    line.push_str(&format!(" {}", format!("({reason})").dimmed()));
                }
            }
            _ => {}
        }
        line
    }

    fn render_assertions(outcome: &TestOutcome) -> Vec<String> {
        outcome
            .assertions
            .iter()
            .map(|a| {
                let check = if a.passed { "└─ ✓".green() } else { "└─ ✗".red() };
                format!("     {} {}", check, a.name)
            })
            .collect()
    }

    /// Verdict and per-status counts.
    pub fn render_summary(&self, results: &RunResults) -> String {
        let passed = results.passed_count();
        let failed = results.failed_count();
        let expected = results.expected_failure_count();
        let skipped = results.skipped_count();
        let total = results.total_count();

        let (verdict, color) = if failed == 0 {
            ("PASSED", colored::Color::Green)
        } else if passed + expected > 0 {
            ("MIXED", colored::Color::Yellow)
        } else {
            ("FAILED", colored::Color::Red)
        };

        let mut parts = vec![];
        if passed > 0 {
            parts.push(format!("{passed} passed").green().to_string());
        }
        if failed > 0 {
            parts.push(format!("{failed} failed").red().to_string());
        }
        if expected > 0 {
            parts.push(format!("{expected} expected failures").yellow().to_string());
        }
        if skipped > 0 {
            parts.push(format!("{skipped} skipped").dimmed().to_string());
        }

        let mut out = format!("\n{}\n", "━".repeat(40).dimmed());
        out.push_str(&format!(
            "{}\n",
            format!("{verdict}: {total} tests").color(color).bold()
        ));
        if !parts.is_empty() {
            out.push_str(&format!("   {}\n", parts.join(", ")));
        }
        if results.leaked_sessions > 0 {
            out.push_str(&format!(
                "   {}\n",
                format!("{} browser sessions leaked", results.leaked_sessions).red()
            ));
        }
        out.push_str(&format!(
            "\n   {}\n",
            format!("Completed in {:.1}s", results.duration.as_secs_f64()).dimmed()
        ));
        out
    }

    /// Failed tests with their failed assertions, console errors and screenshot.
    pub fn render_failures(&self, results: &RunResults) -> String {
        let failures = results.failures();
        if failures.is_empty() {
            return String::new();
        }
        let mut out = format!("\n{}\n\n", "Failed Tests:".red().bold());
        for outcome in failures {
            out.push_str(&format!("  {} {}\n", "✗".red(), outcome.test_id.red().bold()));
            out.push_str(&format!("     {}\n", outcome.title.dimmed()));
            if let Some(message) = &outcome.message {
                out.push_str(&format!("     {message}\n"));
            }
            for assertion in outcome.failed_assertions() {
                out.push_str(&format!("     {} {}\n", "✗".red(), assertion.name));
                out.push_str(&format!("       Expected: {}\n", assertion.expected.green()));
                out.push_str(&format!("       Actual:   {}\n", assertion.actual.red()));
            }
            for error in &outcome.console_errors {
                out.push_str(&format!("     console: {}\n", error.dimmed()));
            }
            if let Some(path) = &outcome.screenshot {
                out.push_str(&format!("     screenshot: {}\n", path.display()));
            }
            out.push('\n');
        }
        out
    }

    /// Known defects that reproduced, listed apart from real failures.
    pub fn render_expected_failures(&self, results: &RunResults) -> String {
        let expected = results.expected_failures();
        if expected.is_empty() {
            return String::new();
        }
        let mut out = format!("\n{}\n", "Expected Failures (known defects):".yellow().bold());
        for outcome in expected {
            out.push_str(&format!(
                "  {} {} {}\n",
                "x".yellow(),
                outcome.test_id,
                outcome.defect_id.as_deref().unwrap_or("").yellow()
            ));
        }
        out
    }

    pub fn print_summary(&self, results: &RunResults) {
        print!("{}", self.render_summary(results));
    }

    pub fn print_failures(&self, results: &RunResults) {
        print!("{}", self.render_failures(results));
        print!("{}", self.render_expected_failures(results));
    }

    fn print_quiet_summary(results: &RunResults) {
        let failed = results.failed_count();
        let total = results.total_count();
        if failed == 0 {
            println!("{}", format!("✓ {total} tests, none failed").green());
        } else {
            println!("{}", format!("✗ {failed}/{total} failed").red());
        }
    }
}

impl EventSink for TerminalReporter {
    fn name(&self) -> &str {
        "terminal"
    }

    fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError> {
        match event {
            RunEvent::RunStarted { total, workers } => {
                if self.verbosity != Verbosity::Quiet {
                    println!(
                        "\n{}\n",
                        format!(
                            "Running {} test{} on {} worker{}...",
                            total,
                            if *total == 1 { "" } else { "s" },
                            workers,
                            if *workers == 1 { "" } else { "s" }
                        )
                        .bold()
                    );
                }
            }
            RunEvent::TestStarted { test_id, suite, .. } => {
                if self.verbosity == Verbosity::Verbose {
                    if self.current_suite.as_deref() != Some(suite.as_str()) {
                        self.current_suite = Some(suite.clone());
                        println!("{}", suite.bold().underline());
                    }
                    println!("  {} {}", "▶".dimmed(), test_id);
                }
            }
            RunEvent::TestCompleted { outcome } | RunEvent::TestSkipped { outcome } => {
                if self.verbosity != Verbosity::Quiet {
                    println!("{}", self.render_outcome(outcome));
                }
                if self.verbosity == Verbosity::Verbose {
                    for line in Self::render_assertions(outcome) {
                        println!("{line}");
                    }
                }
            }
            RunEvent::RunCompleted { results } => {
                if self.verbosity == Verbosity::Quiet {
                    Self::print_quiet_summary(results);
                    print!("{}", self.render_failures(results));
                } else {
                    self.print_failures(results);
                    self.print_summary(results);
                }
            }
        }
        Ok(())
    }
}
