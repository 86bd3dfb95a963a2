//! Registry of known defects in the app under test.
//!
//! Negative tests name a defect id when they characterise a documented bug.
//! The runner looks the id up here to decide whether a reproduced symptom is
//! an expected failure or a regression.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a defect file.
#[derive(Debug, Error)]
pub enum DefectError {
    #[error("failed to read defect file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse defect file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("defect entry has an empty id")]
    EmptyId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectStatus {
    Open,
    Resolved,
}

impl fmt::Display for DefectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectStatus::Open => f.write_str("open"),
            DefectStatus::Resolved => f.write_str("resolved"),
        }
    }
}

/// A documented bug of the app under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDefect {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub severity: Severity,
    pub expected_symptom: String,
    pub status: DefectStatus,
}

impl KnownDefect {
    pub fn is_open(&self) -> bool {
        self.status == DefectStatus::Open
    }
}

/// Direct navigation to a category slug URL returns a 404 page.
pub const DEF_001: &str = "DEF-001";

/// Paginating past the last valid page errors or loads forever.
pub const DEF_002: &str = "DEF-002";

#[derive(Debug, Deserialize)]
struct DefectFile {
    defects: Vec<KnownDefect>,
}

/// Read-only id → defect lookup, built once before tests fan out.
#[derive(Debug, Clone, Default)]
pub struct DefectRegistry {
    defects: BTreeMap<String, KnownDefect>,
}

impl DefectRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The defects documented for the Discover app.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(KnownDefect {
            id: DEF_001.to_string(),
            title: "Direct category URL returns 404".to_string(),
            severity: Severity::Medium,
            expected_symptom: "Navigating directly to a category slug such as /popular \
                               renders a 404 page instead of the category"
                .to_string(),
            status: DefectStatus::Open,
        });
        registry.insert(KnownDefect {
            id: DEF_002.to_string(),
            title: "Pagination breaks past the last valid page".to_string(),
            severity: Severity::High,
            expected_symptom: "Paginating to or beyond the last advertised page shows an \
                               error or loads forever instead of an end-of-results state"
                .to_string(),
            status: DefectStatus::Open,
        });
        registry
    }

    /// Built-in defects overridden or extended by a YAML file.
    ///
    /// ```yaml
    /// defects:
    ///   - id: DEF-002
    ///     severity: high
    ///     expected_symptom: "..."
    ///     status: resolved
    /// ```
    pub fn from_yaml_file(path: &Path) -> Result<Self, DefectError> {
        let content = std::fs::read_to_string(path).map_err(|source| DefectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: DefectFile =
            serde_yaml::from_str(&content).map_err(|source| DefectError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut registry = Self::builtin();
        for defect in file.defects {
            if defect.id.trim().is_empty() {
                return Err(DefectError::EmptyId);
            }
            registry.insert(defect);
        }
        Ok(registry)
    }

    /// Loads the registry for a run: the file when given, built-ins otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, DefectError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::builtin()),
        }
    }

    fn insert(&mut self, defect: KnownDefect) {
        self.defects.insert(defect.id.clone(), defect);
    }

    /// Builder used by tests to flip a defect's status.
    pub fn with_status(mut self, id: &str, status: DefectStatus) -> Self {
        if let Some(defect) = self.defects.get_mut(id) {
            defect.status = status;
        }
        self
    }

    pub fn lookup(&self, id: &str) -> Option<&KnownDefect> {
        self.defects.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &KnownDefect> {
        self.defects.values()
    }

    pub fn len(&self) -> usize {
        self.defects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }
}
