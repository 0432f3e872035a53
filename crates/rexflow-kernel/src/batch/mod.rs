//! HTCondor DAGMan rendering
//!
//! Turns a [`PipelineGraph`] into one submit description per non-empty node
//! and a DAG file wiring them together. Rendering is pure; [`BatchExecutor::write`]
//! puts the files on disk and [`BatchExecutor::submit`] hands the DAG to the
//! scheduler.
//!
//! Layout inside the workspace:
//!
//! ```text
//! <ws>/sub/<dag_name>.dag
//! <ws>/sub/<job>.sub
//! <ws>/log/  <ws>/out/  <ws>/err/
//! ```

use crate::dag::PipelineGraph;
use crate::error::PipelineError;
use crate::settings::{resolve_executable, CondorSettings, RexflowSettings, ToolPaths};
use crate::types::{StageKind, Tool};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Subdirectory holding submit descriptions and the DAG file
pub const SUBMIT_DIR: &str = "sub";
/// Subdirectory for job logs
pub const LOG_DIR: &str = "log";
/// Subdirectory for job stdout
pub const OUT_DIR: &str = "out";
/// Subdirectory for job stderr
pub const ERR_DIR: &str = "err";

/// One DAG node: a submit description with one queue entry per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondorJob {
    /// DAG job name
    pub name: String,
    /// Stage it runs
    pub stage: StageKind,
    /// Absolute executable path
    pub executable: PathBuf,
    /// One argument vector per queued process
    pub arguments: Vec<Vec<String>>,
}

/// Complete DAG ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondorDag {
    workspace: PathBuf,
    name: String,
    params: CondorSettings,
    jobs: Vec<CondorJob>,
    edges: Vec<(String, String)>,
}

impl CondorDag {
    /// Jobs in rank order
    #[inline]
    #[must_use]
    pub fn jobs(&self) -> &[CondorJob] {
        &self.jobs
    }

    /// Job by name
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&CondorJob> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// `(parent, child)` job name pairs
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Directory receiving submit files and the DAG
    #[must_use]
    pub fn submit_dir(&self) -> PathBuf {
        self.workspace.join(SUBMIT_DIR)
    }

    /// Path of the DAG file
    #[must_use]
    pub fn dag_file(&self) -> PathBuf {
        self.submit_dir().join(format!("{}.dag", self.name))
    }

    /// Path of a job's submit description
    #[must_use]
    pub fn submit_file(&self, job: &CondorJob) -> PathBuf {
        self.submit_dir().join(format!("{}.sub", job.name))
    }

    /// Submit description text for `job`
    #[must_use]
    pub fn render_submit(&self, job: &CondorJob) -> String {
        let ws = &self.workspace;
        let p = &self.params;
        let mut out = String::new();
        let _ = writeln!(out, "executable = {}", job.executable.display());
        let _ = writeln!(out, "universe = {}", p.universe);
        let _ = writeln!(out, "getenv = {}", if p.getenv { "True" } else { "False" });
        let _ = writeln!(out, "notification = {}", p.notification);
        let _ = writeln!(out, "request_memory = {}", p.request_memory);
        let _ = writeln!(out, "initialdir = {}", ws.display());
        let _ = writeln!(out, "log = {}", ws.join(LOG_DIR).join(format!("{}.log", job.name)).display());
        let _ = writeln!(
            out,
            "output = {}",
            ws.join(OUT_DIR).join(format!("{}.$(Cluster).$(Process).out", job.name)).display()
        );
        let _ = writeln!(
            out,
            "error = {}",
            ws.join(ERR_DIR).join(format!("{}.$(Cluster).$(Process).err", job.name)).display()
        );
        for line in &p.extra_lines {
            let _ = writeln!(out, "{line}");
        }
        for args in &job.arguments {
            let _ = writeln!(out, "arguments = {}", quote_arguments(args));
            out.push_str("queue\n");
        }
        out
    }

    /// DAG file text
    #[must_use]
    pub fn render_dag(&self) -> String {
        let mut out = String::new();
        for job in &self.jobs {
            let _ = writeln!(out, "JOB {} {}", job.name, self.submit_file(job).display());
        }
        for (parent, child) in &self.edges {
            let _ = writeln!(out, "PARENT {parent} CHILD {child}");
        }
        out
    }
}

/// Quote an argument vector in HTCondor's double-quoted syntax
fn quote_arguments(args: &[String]) -> String {
    let parts: Vec<String> = args
        .iter()
        .map(|arg| {
            let escaped = arg.replace('"', "\"\"").replace('\'', "''");
            if escaped.is_empty() || escaped.contains(char::is_whitespace) {
                format!("'{escaped}'")
            } else {
                escaped
            }
        })
        .collect();
    format!("\"{}\"", parts.join(" "))
}

/// Renders, writes and submits DAGs
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    tools: ToolPaths,
    params: CondorSettings,
    submitter: Option<PathBuf>,
}

impl BatchExecutor {
    /// Executor for `tools`, resolved from the settings
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` if a tool cannot be located.
    pub fn new(settings: &RexflowSettings, tools: &[Tool]) -> Result<Self, PipelineError> {
        Ok(Self::with_tools(
            ToolPaths::resolve(settings, tools)?,
            settings.condor.clone(),
        ))
    }

    /// Executor with already resolved tools
    #[must_use]
    pub fn with_tools(tools: ToolPaths, params: CondorSettings) -> Self {
        Self {
            tools,
            params,
            submitter: None,
        }
    }

    /// Resolve the submit command now rather than at [`BatchExecutor::submit`]
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` if the submit command is missing.
    pub fn with_submission(mut self) -> Result<Self, PipelineError> {
        self.submitter = Some(resolve_executable(&self.params.submit_command)?);
        Ok(self)
    }

    /// Whether the submit command was resolved up front
    #[inline]
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.submitter.is_some()
    }

    /// Render `graph` for `workspace`; nothing is written or run
    ///
    /// Empty nodes are left out and their parents are wired straight to
    /// their children.
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` if a node needs a tool that was not
    /// resolved.
    pub fn render(&self, graph: &PipelineGraph, workspace: &Path) -> Result<CondorDag, PipelineError> {
        let mut jobs = Vec::new();
        for node in graph.nodes().filter(|n| !n.is_empty()) {
            let tool = node.invocations()[0].tool;
            let executable = self
                .tools
                .get(tool)
                .ok_or_else(|| PipelineError::MissingExecutable {
                    name: tool.to_string(),
                })?
                .to_path_buf();
            jobs.push(CondorJob {
                name: node.kind().job_name().to_string(),
                stage: node.kind(),
                executable,
                arguments: node.invocations().iter().map(|i| i.args.clone()).collect(),
            });
        }

        let mut edges = Vec::new();
        for job in &jobs {
            for parent in graph.effective_parents(job.stage) {
                edges.push((parent.job_name().to_string(), job.name.clone()));
            }
        }
        edges.sort();

        Ok(CondorDag {
            workspace: workspace.to_path_buf(),
            name: self.params.dag_name.clone(),
            params: self.params.clone(),
            jobs,
            edges,
        })
    }

    /// Write submit files, the DAG file and the job output directories
    ///
    /// Returns the DAG file path.
    ///
    /// # Errors
    /// `PipelineError::Io` on any filesystem failure.
    pub fn write(&self, dag: &CondorDag) -> Result<PathBuf, PipelineError> {
        for sub in [SUBMIT_DIR, LOG_DIR, OUT_DIR, ERR_DIR] {
            let dir = dag.workspace.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        for job in dag.jobs() {
            let path = dag.submit_file(job);
            std::fs::write(&path, dag.render_submit(job)).map_err(|e| PipelineError::io(&path, e))?;
        }
        let dag_file = dag.dag_file();
        std::fs::write(&dag_file, dag.render_dag()).map_err(|e| PipelineError::io(&dag_file, e))?;
        tracing::info!(
            dag = %dag_file.display(),
            jobs = dag.jobs().len(),
            edges = dag.edges().len(),
            "wrote condor dag"
        );
        Ok(dag_file)
    }

    /// Submit a written DAG file
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` if the submit command is missing,
    /// `PipelineError::Submit` if it exits non-zero.
    pub async fn submit(&self, dag_file: &Path) -> Result<(), PipelineError> {
        let command = match &self.submitter {
            Some(path) => path.clone(),
            None => resolve_executable(&self.params.submit_command)?,
        };
        let workdir = dag_file.parent().unwrap_or_else(|| Path::new("."));
        tracing::info!(dag = %dag_file.display(), "submitting dag");
        let output = tokio::process::Command::new(&command)
            .arg(dag_file)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| PipelineError::io(&command, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Submit(format!(
                "{} exited with {}: {}",
                self.params.submit_command,
                output.status,
                stderr.trim()
            )));
        }
        tracing::info!("{}", String::from_utf8_lossy(&output.stdout).trim());
        Ok(())
    }
}
