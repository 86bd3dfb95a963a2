//! Run configuration resolution.
//!
//! A run is driven by exactly one [`RunConfiguration`], resolved once per
//! invocation from four layers in order of precedence:
//!
//! 1. CLI overrides ([`ConfigOverrides`])
//! 2. Environment variables (`BASE_URL`, `BROWSER`, `HEADLESS`, `PARALLEL_WORKERS`, ...)
//! 3. An optional YAML config file ([`ConfigFile`])
//! 4. Built-in defaults
//!
//! # Example
//!
//! ```
//! use reelcheck_core::config::{ConfigOverrides, ConfigResolver};
//!
//! let overrides = ConfigOverrides {
//!     browser: Some("firefox".to_string()),
//!     ..ConfigOverrides::default()
//! };
//! let config = ConfigResolver::new()
//!     .with_env(|_| None)
//!     .resolve(&overrides)
//!     .unwrap();
//! assert_eq!(config.browser.as_str(), "firefox");
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default address of the Discover demo app.
pub const DEFAULT_BASE_URL: &str = "https://tmdb-discover.surge.sh";

/// Default address of the data API the app calls.
pub const DEFAULT_API_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Default command used to start the Playwright bridge.
pub const DEFAULT_BRIDGE_COMMAND: &str = "node bridge/playwright-bridge.mjs";

/// Errors raised while resolving the run configuration.
///
/// Any of these aborts the run before a single test starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Browser name is not one of chromium, firefox, webkit.
    #[error("unsupported browser '{0}' (expected chromium, firefox or webkit)")]
    UnsupportedBrowser(String),

    /// Driver name is not one of playwright, simulated.
    #[error("unsupported driver '{0}' (expected playwright or simulated)")]
    UnsupportedDriver(String),

    /// Worker count below one.
    #[error("parallel workers must be at least 1, got {0}")]
    InvalidWorkers(i64),

    /// A value could not be parsed.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// A URL did not parse.
    #[error("invalid URL for {key}: '{value}' ({reason})")]
    InvalidUrl {
        key: String,
        value: String,
        reason: String,
    },

    /// The YAML config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The YAML config file is malformed.
    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Browser engines the session provider can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Chromium (Chrome, Edge)
    Chromium,
    /// Firefox (Gecko)
    Firefox,
    /// WebKit (Safari)
    Webkit,
}

impl BrowserKind {
    /// Returns all supported browsers.
    pub fn all() -> &'static [BrowserKind] {
        &[BrowserKind::Chromium, BrowserKind::Firefox, BrowserKind::Webkit]
    }

    /// Returns the lowercase name used by the bridge and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserKind::Chromium => write!(f, "Chromium"),
            BrowserKind::Firefox => write!(f, "Firefox"),
            BrowserKind::Webkit => write!(f, "WebKit"),
        }
    }
}

impl FromStr for BrowserKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" => Ok(BrowserKind::Webkit),
            _ => Err(ConfigurationError::UnsupportedBrowser(s.to_string())),
        }
    }
}

/// Which browser driver backs the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real browsers through the Playwright bridge process.
    #[default]
    Playwright,
    /// In-process model of the Discover app (offline runs).
    Simulated,
}

impl FromStr for DriverKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playwright" => Ok(DriverKind::Playwright),
            "simulated" | "sim" => Ok(DriverKind::Simulated),
            _ => Err(ConfigurationError::UnsupportedDriver(s.to_string())),
        }
    }
}

/// Marker selection: a test runs when it carries at least one included marker
/// (or no includes are given) and none of the excluded ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerFilter {
    #[serde(default)]
    pub include: BTreeSet<String>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl MarkerFilter {
    /// Returns true if a test with these markers should run.
    pub fn matches(&self, markers: &[&str]) -> bool {
        if markers.iter().any(|m| self.exclude.contains(*m)) {
            return false;
        }
        self.include.is_empty() || markers.iter().any(|m| self.include.contains(*m))
    }

    /// Returns true if no marker constraint is set.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// The immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Address of the app under test.
    pub base_url: Url,
    /// Address of the data API the app calls.
    pub api_base_url: Url,
    /// API key for the data API, if any.
    pub api_key: Option<String>,
    /// Browser engine.
    pub browser: BrowserKind,
    /// Run without a visible window.
    pub headless: bool,
    /// Number of tests that may run at once.
    pub parallel_workers: usize,
    /// Marker include/exclude sets.
    pub markers: MarkerFilter,
    /// Timeout for page navigations.
    pub navigation_timeout: Duration,
    /// Timeout for each element interaction.
    pub action_timeout: Duration,
    /// Timeout for a whole test.
    pub test_timeout: Duration,
    /// Extra attempts for a timed-out interaction (0 = no retries).
    pub interaction_retries: u32,
    /// Browser driver backend.
    pub driver: DriverKind,
    /// Command line that starts the Playwright bridge.
    pub bridge_command: String,
    /// Directory for reports, screenshots and allure results.
    pub reports_dir: PathBuf,
    /// Path of the HTML report.
    pub html_report: PathBuf,
    /// Directory for the log files.
    pub log_dir: PathBuf,
    /// Optional YAML file overriding the built-in defect registry.
    pub defects_file: Option<PathBuf>,
}

impl RunConfiguration {
    /// Directory where failure screenshots are written.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.reports_dir.join("screenshots")
    }

    /// Directory for Allure-compatible result files.
    pub fn allure_dir(&self) -> PathBuf {
        self.reports_dir.join("allure-results")
    }

    /// Resolves a path against the app base URL.
    pub fn url_for(&self, path: &str) -> String {
        match self.base_url.join(path) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path),
        }
    }

    /// Points the data API at `raw`, e.g. a local simulated server.
    pub fn with_api_base_url(mut self, raw: &str) -> Result<Self, ConfigurationError> {
        self.api_base_url = parse_url("API_BASE_URL", raw)?;
        Ok(self)
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        let reports_dir = PathBuf::from("reports");
        Self {
            base_url: parse_url_or_panic(DEFAULT_BASE_URL),
            api_base_url: parse_url_or_panic(DEFAULT_API_BASE_URL),
            api_key: None,
            browser: BrowserKind::Chromium,
            headless: true,
            parallel_workers: 1,
            markers: MarkerFilter::default(),
            navigation_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
            test_timeout: Duration::from_secs(120),
            interaction_retries: 0,
            driver: DriverKind::Playwright,
            bridge_command: DEFAULT_BRIDGE_COMMAND.to_string(),
            html_report: reports_dir.join("report.html"),
            log_dir: reports_dir.join("logs"),
            reports_dir,
            defects_file: None,
        }
    }
}

fn parse_url_or_panic(raw: &str) -> Url {
    // Only used for compile-time constants.
    Url::parse(raw).unwrap_or_else(|e| panic!("built-in URL {raw} is invalid: {e}"))
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub browser: Option<String>,
    pub headless: Option<bool>,
    pub parallel_workers: Option<i64>,
    pub include_markers: Vec<String>,
    pub exclude_markers: Vec<String>,
    pub driver: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub html_report: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

/// The optional YAML config file layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub api_base_url: Option<String>,
    pub browser: Option<String>,
    pub headless: Option<bool>,
    pub parallel_workers: Option<i64>,
    pub markers: Option<MarkerFilter>,
    pub navigation_timeout_ms: Option<u64>,
    pub action_timeout_ms: Option<u64>,
    pub test_timeout_ms: Option<u64>,
    pub interaction_retries: Option<u32>,
    pub driver: Option<String>,
    pub bridge_command: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub defects_file: Option<PathBuf>,
}

impl ConfigFile {
    /// Loads a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigurationError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Merges CLI, environment, file and defaults into a [`RunConfiguration`].
pub struct ConfigResolver {
    env: EnvLookup,
    load_dotenv: bool,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Creates a resolver reading the process environment (and `.env`).
    pub fn new() -> Self {
        Self {
            env: Box::new(|key| std::env::var(key).ok()),
            load_dotenv: true,
        }
    }

    /// Replaces the environment lookup (used by tests).
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self.load_dotenv = false;
        self
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|v| !v.trim().is_empty())
    }

    /// Resolves the configuration. Never touches anything beyond reading files.
    pub fn resolve(
        &self,
        overrides: &ConfigOverrides,
    ) -> Result<RunConfiguration, ConfigurationError> {
        if self.load_dotenv {
            // A missing .env is the common case.
            let _ = dotenvy::dotenv();
        }

        let file_path = overrides
            .config_file
            .clone()
            .or_else(|| self.var("QA_CONFIG").map(PathBuf::from));
        let file = match &file_path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };

        let defaults = RunConfiguration::default();

        let base_url = pick(
            overrides.base_url.clone(),
            self.var("BASE_URL"),
            file.base_url.clone(),
        )
        .map(|raw| parse_url("BASE_URL", &raw))
        .transpose()?
        .unwrap_or(defaults.base_url);

        let api_base_url = pick(None, self.var("API_BASE_URL"), file.api_base_url.clone())
            .map(|raw| parse_url("API_BASE_URL", &raw))
            .transpose()?
            .unwrap_or(defaults.api_base_url);

        let browser = pick(
            overrides.browser.clone(),
            self.var("BROWSER"),
            file.browser.clone(),
        )
        .map(|raw| raw.parse::<BrowserKind>())
        .transpose()?
        .unwrap_or(defaults.browser);

        let headless = match (overrides.headless, self.var("HEADLESS")) {
            (Some(v), _) => v,
            (None, Some(raw)) => parse_bool("HEADLESS", &raw)?,
            (None, None) => file.headless.unwrap_or(defaults.headless),
        };

        let workers = match (overrides.parallel_workers, self.var("PARALLEL_WORKERS")) {
            (Some(v), _) => v,
            (None, Some(raw)) => parse_number::<i64>("PARALLEL_WORKERS", &raw)?,
            (None, None) => file.parallel_workers.unwrap_or(1),
        };
        if workers < 1 {
            return Err(ConfigurationError::InvalidWorkers(workers));
        }

        let mut markers = file.markers.clone().unwrap_or_default();
        if !overrides.include_markers.is_empty() {
            markers.include = overrides.include_markers.iter().cloned().collect();
        }
        if !overrides.exclude_markers.is_empty() {
            markers.exclude = overrides.exclude_markers.iter().cloned().collect();
        }

        let navigation_timeout = self.duration_ms(
            "NAVIGATION_TIMEOUT_MS",
            file.navigation_timeout_ms,
            defaults.navigation_timeout,
        )?;
        let action_timeout = self.duration_ms(
            "ACTION_TIMEOUT_MS",
            file.action_timeout_ms,
            defaults.action_timeout,
        )?;
        let test_timeout = self.duration_ms(
            "TEST_TIMEOUT_MS",
            file.test_timeout_ms,
            defaults.test_timeout,
        )?;

        let interaction_retries = match self.var("INTERACTION_RETRIES") {
            Some(raw) => parse_number::<u32>("INTERACTION_RETRIES", &raw)?,
            None => file.interaction_retries.unwrap_or(0),
        };

        let driver = pick(
            overrides.driver.clone(),
            self.var("QA_DRIVER"),
            file.driver.clone(),
        )
        .map(|raw| raw.parse::<DriverKind>())
        .transpose()?
        .unwrap_or_default();

        let bridge_command = pick(
            None,
            self.var("QA_BRIDGE_COMMAND"),
            file.bridge_command.clone(),
        )
        .unwrap_or(defaults.bridge_command);

        let reports_dir = pick(
            overrides.reports_dir.clone(),
            self.var("REPORTS_DIR").map(PathBuf::from),
            file.reports_dir.clone(),
        )
        .unwrap_or(defaults.reports_dir);

        let html_report = overrides
            .html_report
            .clone()
            .unwrap_or_else(|| reports_dir.join("report.html"));

        Ok(RunConfiguration {
            base_url,
            api_base_url,
            api_key: self.var("API_KEY"),
            browser,
            headless,
            parallel_workers: workers as usize,
            markers,
            navigation_timeout,
            action_timeout,
            test_timeout,
            interaction_retries,
            driver,
            bridge_command,
            log_dir: reports_dir.join("logs"),
            html_report,
            reports_dir,
            defects_file: file.defects_file,
        })
    }

    fn duration_ms(
        &self,
        key: &str,
        file_value: Option<u64>,
        default: Duration,
    ) -> Result<Duration, ConfigurationError> {
        match self.var(key) {
            Some(raw) => Ok(Duration::from_millis(parse_number::<u64>(key, &raw)?)),
            None => Ok(file_value.map_or(default, Duration::from_millis)),
        }
    }
}

/// CLI > env > file.
fn pick<T>(cli: Option<T>, env: Option<T>, file: Option<T>) -> Option<T> {
    cli.or(env).or(file)
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigurationError> {
    Url::parse(raw.trim()).map_err(|e| ConfigurationError::InvalidUrl {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigurationError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolver(vars: &[(&str, &str)]) -> ConfigResolver {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConfigResolver::new().with_env(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_given() {
        let config = resolver(&[]).resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(config.base_url.as_str(), "https://tmdb-discover.surge.sh/");
        assert_eq!(config.browser, BrowserKind::Chromium);
        assert!(config.headless);
        assert_eq!(config.parallel_workers, 1);
        assert_eq!(config.interaction_retries, 0);
        assert_eq!(config.driver, DriverKind::Playwright);
        assert_eq!(config.html_report, PathBuf::from("reports/report.html"));
    }

    #[test]
    fn test_api_base_override_keeps_app_url() {
        let config = RunConfiguration::default()
            .with_api_base_url("http://127.0.0.1:4010/3")
            .unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://127.0.0.1:4010/3");
        assert_eq!(config.base_url.as_str(), "https://tmdb-discover.surge.sh/");

        let copy = config.clone();
        assert_eq!(copy.api_base_url, config.api_base_url);
        assert!(matches!(
            config.with_api_base_url("not a url"),
            Err(ConfigurationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = resolver(&[
            ("BASE_URL", "http://localhost:8080"),
            ("BROWSER", "webkit"),
            ("HEADLESS", "false"),
            ("PARALLEL_WORKERS", "4"),
        ])
        .resolve(&ConfigOverrides::default())
        .unwrap();

        assert_eq!(config.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.browser, BrowserKind::Webkit);
        assert!(!config.headless);
        assert_eq!(config.parallel_workers, 4);
    }

    #[test]
    fn test_cli_overrides_env() {
        let overrides = ConfigOverrides {
            browser: Some("firefox".to_string()),
            headless: Some(true),
            parallel_workers: Some(2),
            ..ConfigOverrides::default()
        };
        let config = resolver(&[
            ("BROWSER", "webkit"),
            ("HEADLESS", "0"),
            ("PARALLEL_WORKERS", "8"),
        ])
        .resolve(&overrides)
        .unwrap();

        assert_eq!(config.browser, BrowserKind::Firefox);
        assert!(config.headless);
        assert_eq!(config.parallel_workers, 2);
    }

    #[test]
    fn test_unsupported_browser_is_configuration_error() {
        let result = resolver(&[("BROWSER", "netscape")]).resolve(&ConfigOverrides::default());
        assert!(matches!(
            result,
            Err(ConfigurationError::UnsupportedBrowser(name)) if name == "netscape"
        ));
    }

    #[test]
    fn test_zero_workers_is_configuration_error() {
        let overrides = ConfigOverrides {
            parallel_workers: Some(0),
            ..ConfigOverrides::default()
        };
        let result = resolver(&[]).resolve(&overrides);
        assert!(matches!(result, Err(ConfigurationError::InvalidWorkers(0))));
    }

    #[test]
    fn test_unparseable_env_values_are_rejected() {
        let result = resolver(&[("HEADLESS", "maybe")]).resolve(&ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));

        let result = resolver(&[("PARALLEL_WORKERS", "many")]).resolve(&ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));

        let result = resolver(&[("BASE_URL", "not a url")]).resolve(&ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigurationError::InvalidUrl { .. })));
    }

    #[test]
    fn test_config_file_sits_below_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qa.yml");
        std::fs::write(
            &path,
            "browser: firefox\nparallel_workers: 3\naction_timeout_ms: 2500\nmarkers:\n  exclude: [slow]\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            config_file: Some(path),
            ..ConfigOverrides::default()
        };
        let config = resolver(&[("BROWSER", "webkit")]).resolve(&overrides).unwrap();

        assert_eq!(config.browser, BrowserKind::Webkit);
        assert_eq!(config.parallel_workers, 3);
        assert_eq!(config.action_timeout, Duration::from_millis(2500));
        assert!(config.markers.exclude.contains("slow"));
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qa.yml");
        std::fs::write(&path, "browsr: firefox\n").unwrap();

        let overrides = ConfigOverrides {
            config_file: Some(path),
            ..ConfigOverrides::default()
        };
        let result = resolver(&[]).resolve(&overrides);
        assert!(matches!(result, Err(ConfigurationError::ParseFile { .. })));
    }

    #[test]
    fn test_cli_markers_replace_file_markers() {
        let overrides = ConfigOverrides {
            include_markers: vec!["smoke".to_string()],
            ..ConfigOverrides::default()
        };
        let config = resolver(&[]).resolve(&overrides).unwrap();
        assert!(config.markers.include.contains("smoke"));
        assert!(config.markers.exclude.is_empty());
    }

    #[test]
    fn test_marker_filter_matching() {
        let mut filter = MarkerFilter::default();
        assert!(filter.matches(&["functional"]));
        assert!(filter.matches(&[]));

        filter.include.insert("negative".to_string());
        assert!(filter.matches(&["negative", "regression"]));
        assert!(!filter.matches(&["functional"]));

        filter.exclude.insert("regression".to_string());
        assert!(!filter.matches(&["negative", "regression"]));
    }

    #[test]
    fn test_browser_kind_round_trips_names() {
        for kind in BrowserKind::all() {
            assert_eq!(kind.as_str().parse::<BrowserKind>().unwrap(), *kind);
        }
        assert_eq!("Chrome".parse::<BrowserKind>().unwrap(), BrowserKind::Chromium);
    }

    #[test]
    fn test_url_for_joins_paths() {
        let config = RunConfiguration::default();
        assert_eq!(
            config.url_for("/popular"),
            "https://tmdb-discover.surge.sh/popular"
        );
    }
}
