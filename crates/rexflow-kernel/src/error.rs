//! Kernel error types

use crate::executor::RunReport;
use crate::types::StageKind;
use rexflow_config::{ConfigError, TemplateError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing or running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration could not be read or parsed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration layout could not be turned into a document
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Target workspace directory is already present
    #[error("workspace already exists: {}", .0.display())]
    WorkspaceExists(PathBuf),

    /// A required executable could not be located
    #[error("executable '{name}' not found (searched PATH)")]
    MissingExecutable {
        /// Configured name or path
        name: String,
    },

    /// At least one unit of a wave failed; later waves were not started
    #[error(
        "stage failure in {}: {failed} of {total} units failed",
        display_stages(.stages)
    )]
    StageFailure {
        /// Stage kinds with at least one failed unit
        stages: Vec<StageKind>,
        /// Failed units in the wave
        failed: usize,
        /// Units in the wave
        total: usize,
        /// Everything that ran up to and including the failed wave
        report: Box<RunReport>,
    },

    /// Filesystem or process I/O failure
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Settings file could not be loaded
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Invalid graph construction
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// DAG submission failed
    #[error("submission failed: {0}")]
    Submit(String),
}

impl PipelineError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_stages(stages: &[StageKind]) -> String {
    stages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Node added twice
    #[error("node {0} already present")]
    DuplicateNode(StageKind),

    /// Edge endpoint missing from the graph
    #[error("node {0} not found")]
    NodeNotFound(StageKind),

    /// Edge that does not go to a strictly higher rank
    #[error("edge {from} -> {to} does not follow stage order")]
    InvalidEdge {
        /// Source kind
        from: StageKind,
        /// Target kind
        to: StageKind,
    },
}

/// Settings loading errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("cannot read settings {}: {source}", .path.display())]
    Io {
        /// Settings path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for the settings schema
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result alias for kernel operations
pub type PipelineResult<T> = Result<T, PipelineError>;
