//! Operator settings
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or none at all) is valid.
//!
//! ```toml
//! fitter = "/opt/trex/bin/trex-fitter"
//! workers = 8
//!
//! [blind]
//! fragment = "FitBlind=TRUE"
//! suffix = "Suffix=_asimov"
//!
//! [condor]
//! request_memory = "4GB"
//! extra_lines = ["+MaxRuntime = 7200"]
//! ```

use crate::error::{PipelineError, SettingsError};
use crate::types::Tool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default fitter executable name
pub const DEFAULT_FITTER: &str = "trex-fitter";

/// Default histogram merge executable name
pub const DEFAULT_MERGER: &str = "hupdate.exe";

/// Default DAG submission command
pub const DEFAULT_SUBMIT_COMMAND: &str = "condor_submit_dag";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RexflowSettings {
    /// Fitter executable, a name looked up on PATH or a path
    pub fitter: String,
    /// Histogram merge executable
    pub merger: String,
    /// Local worker pool size; host parallelism when unset
    pub workers: Option<usize>,
    /// Blind fragments appended to fit-dependent invocations
    pub blind: BlindSettings,
    /// HTCondor job parameters
    pub condor: CondorSettings,
}

impl Default for RexflowSettings {
    fn default() -> Self {
        Self {
            fitter: DEFAULT_FITTER.to_string(),
            merger: DEFAULT_MERGER.to_string(),
            workers: None,
            blind: BlindSettings::default(),
            condor: CondorSettings::default(),
        }
    }
}

impl RexflowSettings {
    /// Parse settings from TOML text
    ///
    /// # Errors
    /// `SettingsError::Parse` on invalid TOML or unknown value types.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from `path`, or defaults when `path` is `None`
    ///
    /// # Errors
    /// `SettingsError::Io` if the file cannot be read, `SettingsError::Parse`
    /// if it is not valid.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Set the fitter executable
    #[must_use]
    pub fn with_fitter(mut self, fitter: impl Into<String>) -> Self {
        self.fitter = fitter.into();
        self
    }

    /// Set the merge executable
    #[must_use]
    pub fn with_merger(mut self, merger: impl Into<String>) -> Self {
        self.merger = merger.into();
        self
    }

    /// Set the local worker pool size
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the blind fragments
    #[must_use]
    pub fn with_blind(mut self, blind: BlindSettings) -> Self {
        self.blind = blind;
        self
    }

    /// Effective worker count, at least one
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
            })
            .max(1)
    }
}

/// Fragments that turn an invocation into its blind variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlindSettings {
    /// Fragment requesting a blind fit
    pub fragment: String,
    /// Fragment selecting the Asimov output suffix
    pub suffix: String,
}

impl Default for BlindSettings {
    fn default() -> Self {
        Self {
            fragment: "FitBlind=TRUE".to_string(),
            suffix: "Suffix=_asimov".to_string(),
        }
    }
}

impl BlindSettings {
    /// Non-empty fragments in order
    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        [self.fragment.as_str(), self.suffix.as_str()]
            .into_iter()
            .filter(|f| !f.is_empty())
    }
}

/// Fixed HTCondor job parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CondorSettings {
    /// Universe
    pub universe: String,
    /// Whether jobs inherit the submitting environment
    pub getenv: bool,
    /// Notification policy
    pub notification: String,
    /// Memory request
    pub request_memory: String,
    /// Lines copied verbatim into every submit description
    pub extra_lines: Vec<String>,
    /// DAG file stem
    pub dag_name: String,
    /// Submission command
    pub submit_command: String,
}

impl Default for CondorSettings {
    fn default() -> Self {
        Self {
            universe: "vanilla".to_string(),
            getenv: true,
            notification: "Error".to_string(),
            request_memory: "2GB".to_string(),
            extra_lines: Vec::new(),
            dag_name: "rexflow".to_string(),
            submit_command: DEFAULT_SUBMIT_COMMAND.to_string(),
        }
    }
}

/// Resolved executable paths per [`Tool`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    paths: BTreeMap<Tool, PathBuf>,
}

impl ToolPaths {
    /// Resolve every tool in `tools` from the settings
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` for the first tool not found.
    pub fn resolve(settings: &RexflowSettings, tools: &[Tool]) -> Result<Self, PipelineError> {
        let mut paths = BTreeMap::new();
        for tool in tools {
            let name = match tool {
                Tool::Fitter => &settings.fitter,
                Tool::Merger => &settings.merger,
            };
            let path = resolve_executable(name)?;
            tracing::debug!(%tool, path = %path.display(), "resolved executable");
            paths.insert(*tool, path);
        }
        Ok(Self { paths })
    }

    /// Use `path` for `tool` without resolution
    #[must_use]
    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(tool, path.into());
        self
    }

    /// Path for `tool`, when resolved
    #[must_use]
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.paths.get(&tool).map(PathBuf::as_path)
    }
}

/// Locate an executable
///
/// A value containing a path separator is checked as a path; a bare name is
/// searched on `PATH`.
///
/// # Errors
/// `PipelineError::MissingExecutable` when nothing executable is found.
pub fn resolve_executable(name: &str) -> Result<PathBuf, PipelineError> {
    let missing = || PipelineError::MissingExecutable {
        name: name.to_string(),
    };
    if name.is_empty() {
        return Err(missing());
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(missing())
        };
    }

    let path_var = std::env::var_os("PATH").ok_or_else(missing)?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
        .ok_or_else(missing)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
