//! Run workspaces
//!
//! A workspace is a fresh directory next to the source configuration holding
//! one canonical copy of it (`fit.conf`). Every unit runs with the workspace
//! as its working directory, so the fitter's relative outputs land inside it.

use crate::error::PipelineError;
use rexflow_config::Document;
use std::path::{Path, PathBuf};

/// Name of the configuration copy inside a workspace
pub const CONFIG_NAME: &str = "fit.conf";

/// Marker selecting the histogram files copied from a previous run
pub const HISTOGRAM_SUFFIX: &str = "histos.root";

/// An exclusively created run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Directory a run of `config` would use
    ///
    /// `<parent>/<stem>.<label>[.<suffix>].d`
    #[must_use]
    pub fn path_for(config: &Path, label: &str, suffix: Option<&str>) -> PathBuf {
        let stem = config
            .file_stem()
            .map_or_else(|| "config".into(), |s| s.to_string_lossy());
        let name = match suffix.filter(|s| !s.is_empty()) {
            Some(suffix) => format!("{stem}.{label}.{suffix}.d"),
            None => format!("{stem}.{label}.d"),
        };
        config.parent().unwrap_or_else(|| Path::new(".")).join(name)
    }

    /// Create the workspace for `config` and copy it in
    ///
    /// # Errors
    /// `PipelineError::WorkspaceExists` when the directory is already there,
    /// `PipelineError::Io` on any other filesystem failure.
    pub fn create(config: &Path, label: &str, suffix: Option<&str>) -> Result<Self, PipelineError> {
        let dir = Self::path_for(config, label, suffix);
        let workspace = Self::create_dir(&dir)?;
        let target = workspace.config_path();
        std::fs::copy(config, &target).map_err(|e| PipelineError::io(config, e))?;
        tracing::info!(workspace = %workspace.root.display(), "created workspace");
        Ok(workspace)
    }

    /// Create a workspace at `dir` holding `document` as its configuration
    ///
    /// # Errors
    /// As [`Workspace::create`].
    pub fn create_with_document(dir: &Path, document: &Document) -> Result<Self, PipelineError> {
        let workspace = Self::create_dir(dir)?;
        document.write(workspace.config_path())?;
        tracing::info!(workspace = %workspace.root.display(), "created workspace");
        Ok(workspace)
    }

    /// Open an existing workspace
    ///
    /// # Errors
    /// `PipelineError::Io` if the directory has no configuration copy.
    pub fn open(dir: &Path) -> Result<Self, PipelineError> {
        let root = std::fs::canonicalize(dir).map_err(|e| PipelineError::io(dir, e))?;
        let workspace = Self { root };
        let config = workspace.config_path();
        if !config.is_file() {
            return Err(PipelineError::io(
                config,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(workspace)
    }

    fn create_dir(dir: &Path) -> Result<Self, PipelineError> {
        match std::fs::create_dir(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::WorkspaceExists(dir.to_path_buf()));
            }
            Err(e) => return Err(PipelineError::io(dir, e)),
        }
        let root = std::fs::canonicalize(dir).map_err(|e| PipelineError::io(dir, e))?;
        Ok(Self { root })
    }

    /// Absolute workspace directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the configuration copy
    #[inline]
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_NAME)
    }

    /// Parse the configuration copy
    ///
    /// # Errors
    /// Read or parse failures of the copy.
    pub fn document(&self) -> Result<Document, PipelineError> {
        Ok(Document::read(self.config_path())?)
    }

    /// Where the fitter keeps histograms for job `job_name`
    #[must_use]
    pub fn histograms_dir(&self, job_name: &str) -> PathBuf {
        self.root.join(job_name).join("Histograms")
    }

    /// Copy every `*histos.root` file from `source` into the histogram directory
    ///
    /// Returns the number of files copied.
    ///
    /// # Errors
    /// `PipelineError::Io` if `source` cannot be listed or a copy fails.
    pub fn copy_histograms_from(&self, source: &Path, job_name: &str) -> Result<usize, PipelineError> {
        let target = self.histograms_dir(job_name);
        std::fs::create_dir_all(&target).map_err(|e| PipelineError::io(&target, e))?;

        let entries = std::fs::read_dir(source).map_err(|e| PipelineError::io(source, e))?;
        let mut copied = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(source, e))?;
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(HISTOGRAM_SUFFIX));
            if !matches || !path.is_file() {
                continue;
            }
            let dest = target.join(entry.file_name());
            std::fs::copy(&path, &dest).map_err(|e| PipelineError::io(&path, e))?;
            copied += 1;
        }
        if copied == 0 {
            tracing::warn!(source = %source.display(), "no histogram files found to copy");
        } else {
            tracing::info!(copied, target = %target.display(), "copied histograms");
        }
        Ok(copied)
    }
}
