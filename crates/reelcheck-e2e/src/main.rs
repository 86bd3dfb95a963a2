//! # reelcheck
//!
//! Runs the Discover app suites against a browser driver and writes reports.
//!
//! ## Usage
//!
//! ```bash
//! # Everything, offline against the simulated app
//! reelcheck --driver simulated
//!
//! # One suite, one module, one case
//! reelcheck negative
//! reelcheck functional/combined_filters
//! reelcheck functional/combined_filters::TC-035
//!
//! # By marker or keyword
//! reelcheck -m smoke
//! reelcheck -k "pagination" -n 4
//!
//! # List cases without running them
//! reelcheck --list
//! ```
//!
//! Exit codes: 0 when every test passed, was skipped or failed as expected,
//! 1 on any failure or an empty selection, 2 on configuration errors.

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use reelcheck_core::logging;
use reelcheck_core::testing::{SimulatedApiServer, SimulatedDriver};
use reelcheck_core::{
    AllureWriter, BrowserDriver, ConfigOverrides, ConfigResolver, ConfigurationError,
    DefectRegistry, DriverKind, JsonlWriter, PlaywrightBridgeDriver, ReportWriter, Selection,
    TerminalReporter, TestRunner, Verbosity,
};
use reelcheck_e2e::{all_cases, describe_cases};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// Browser QA for the Discover movie app.
#[derive(Parser, Debug)]
#[command(name = "reelcheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Suites, modules or cases to run, e.g. `negative` or
    /// `functional/combined_filters::TC-035`
    pub paths: Vec<String>,

    /// Run only tests carrying one of these markers
    #[arg(short = 'm', long = "marker", value_delimiter = ',')]
    pub markers: Vec<String>,

    /// Skip tests carrying any of these markers
    #[arg(long = "exclude-marker", value_delimiter = ',')]
    pub exclude_markers: Vec<String>,

    /// Run only tests whose id, title or path matches this pattern
    #[arg(short = 'k', long = "filter")]
    pub filter: Option<String>,

    /// Browser engine: chromium, firefox or webkit
    #[arg(long)]
    pub browser: Option<String>,

    /// Show the browser window
    #[arg(long, conflicts_with = "headless")]
    pub headed: bool,

    /// Run without a browser window
    #[arg(long)]
    pub headless: bool,

    /// Number of tests to run at once
    #[arg(short = 'n', long)]
    pub workers: Option<i64>,

    /// Address of the app under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Path of the HTML report
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// Directory for reports, screenshots and logs
    #[arg(long)]
    pub reports_dir: Option<PathBuf>,

    /// Browser driver: playwright or simulated
    #[arg(long)]
    pub driver: Option<String>,

    /// YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List matching tests without running them
    #[arg(long)]
    pub list: bool,

    /// Show each assertion and debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Only show the summary and failures
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
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

    fn overrides(&self) -> ConfigOverrides {
        let headless = match (self.headed, self.headless) {
            (true, _) => Some(false),
            (_, true) => Some(true),
            _ => None,
        };
        ConfigOverrides {
            base_url: self.base_url.clone(),
            browser: self.browser.clone(),
            headless,
            parallel_workers: self.workers,
            include_markers: self.markers.clone(),
            exclude_markers: self.exclude_markers.clone(),
            driver: self.driver.clone(),
            reports_dir: self.reports_dir.clone(),
            html_report: self.html.clone(),
            config_file: self.config.clone(),
        }
    }
}

/// Maps a run-ending error to the process exit code.
fn error_exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigurationError>().is_some() {
        2
    } else {
        1
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();

    if verbosity != Verbosity::Quiet && !cli.list {
        println!(
            "\n{} {}",
            "reelcheck".bold(),
            format!("v{}", reelcheck_core::VERSION).dimmed()
        );
        println!("{}", "━".repeat(40).dimmed());
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} failed to start the async runtime: {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(&cli, verbosity)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::from(error_exit_code(&e))
        }
    }
}

async fn run(cli: &Cli, verbosity: Verbosity) -> anyhow::Result<u8> {
    let mut config = ConfigResolver::new().resolve(&cli.overrides())?;
    let selection = Selection {
        paths: cli.paths.clone(),
        keyword: cli.filter.as_deref().map(Selection::keyword).transpose()?,
        markers: config.markers.clone(),
    };

    let cases = all_cases();
    if cli.list {
        let matching: Vec<_> = cases
            .into_iter()
            .filter(|c| selection.matches(c.as_ref()))
            .collect();
        for line in describe_cases(&matching) {
            println!("{line}");
        }
        println!("\n{} tests", matching.len());
        return Ok(0);
    }

    let log_files = logging::init(&config.log_dir, verbosity).context("failed to set up logging")?;
    let registry = Arc::new(
        DefectRegistry::load(config.defects_file.as_deref())
            .context("failed to load the defect registry")?,
    );

    let mut api_server = None;
    let driver: Arc<dyn BrowserDriver> = match config.driver {
        DriverKind::Simulated => {
            let server = SimulatedApiServer::start()
                .await
                .context("failed to start the simulated data API")?;
            config = config.with_api_base_url(&server.base_url())?;
            api_server = Some(server);
            Arc::new(SimulatedDriver::new())
        }
        DriverKind::Playwright => {
            Arc::new(PlaywrightBridgeDriver::from_command(&config.bridge_command)?)
        }
    };

    info!(
        base_url = %config.base_url,
        api_base_url = %config.api_base_url,
        browser = %config.browser,
        workers = config.parallel_workers,
        "Configuration resolved"
    );

    let config = Arc::new(config);
    let mut runner = TestRunner::new(
        Arc::clone(&config),
        driver,
        Arc::clone(&registry),
        cases,
    )?
    .add_sink(TerminalReporter::with_verbosity(verbosity))
    .add_sink(JsonlWriter::new(&config.reports_dir))
    .add_sink(AllureWriter::new(config.allure_dir()))
    .add_sink(ReportWriter::new(
        config.reports_dir.clone(),
        config.html_report.clone(),
        Arc::clone(&registry),
    ));

    let results = runner.run(&selection).await;
    if let Some(server) = api_server {
        server.shutdown().await;
    }
    let results = results?;

    if verbosity != Verbosity::Quiet {
        println!(
            "\n{} {}",
            "Report:".dimmed(),
            config.html_report.display().to_string().cyan()
        );
        println!(
            "{} {}",
            "Logs:  ".dimmed(),
            log_files.execution.display().to_string().cyan()
        );
    }
    if results.leaked_sessions > 0 {
        tracing::warn!(leaked = results.leaked_sessions, "Browser sessions were not released");
    }

    Ok(u8::try_from(results.exit_code()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_maps_to_overrides() {
        let cli = Cli::parse_from([
            "reelcheck",
            "negative",
            "-m",
            "smoke,regression",
            "--exclude-marker",
            "slow",
            "-n",
            "4",
            "--headed",
            "--driver",
            "simulated",
        ]);
        let overrides = cli.overrides();
        assert_eq!(cli.paths, vec!["negative"]);
        assert_eq!(overrides.include_markers, vec!["smoke", "regression"]);
        assert_eq!(overrides.exclude_markers, vec!["slow"]);
        assert_eq!(overrides.parallel_workers, Some(4));
        assert_eq!(overrides.headless, Some(false));
        assert_eq!(overrides.driver.as_deref(), Some("simulated"));
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Cli::parse_from(["reelcheck"]).verbosity(), Verbosity::Normal);
        assert_eq!(Cli::parse_from(["reelcheck", "-q"]).verbosity(), Verbosity::Quiet);
        assert_eq!(Cli::parse_from(["reelcheck", "-v"]).verbosity(), Verbosity::Verbose);
        assert!(Cli::try_parse_from(["reelcheck", "-q", "-v"]).is_err());
        assert!(Cli::try_parse_from(["reelcheck", "--headed", "--headless"]).is_err());
    }

    #[test]
    fn test_configuration_errors_exit_with_two() {
        let err = anyhow::Error::from(ConfigurationError::InvalidWorkers(0));
        assert_eq!(error_exit_code(&err), 2);
        let err = anyhow::anyhow!("no tests matched the selection");
        assert_eq!(error_exit_code(&err), 1);
    }
}
