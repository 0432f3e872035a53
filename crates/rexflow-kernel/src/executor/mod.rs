//! Local execution
//!
//! Runs a [`PipelineGraph`] wave by wave on a bounded pool of child
//! processes. Every unit of a wave is dispatched together; a semaphore
//! bounds how many children are alive at once. The executor waits for the
//! whole wave before looking at the next one.
//!
//! # Failure policy
//!
//! A unit that exits non-zero (or cannot be spawned) is recorded and its
//! siblings keep running. Once the wave has drained, any failure stops the
//! pipeline with [`PipelineError::StageFailure`] carrying the report.

use crate::dag::PipelineGraph;
use crate::error::PipelineError;
use crate::scheduler::{Schedule, WorkUnit};
use crate::settings::{RexflowSettings, ToolPaths};
use crate::types::{StageKind, Tool};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// File name of the JSON run report inside the workspace
pub const REPORT_FILE: &str = "rexflow-report.json";

/// Runs one unit of work
///
/// Implement this trait to change how invocations are carried out; the
/// scheduling policy of [`LocalExecutor`] does not depend on it.
#[async_trait::async_trait]
pub trait UnitRunner: Send + Sync {
    /// Run `unit` with `workdir` as its working directory
    ///
    /// Returns the exit code, `None` when the process was terminated by a
    /// signal.
    async fn run_unit(&self, unit: &WorkUnit, workdir: &Path) -> std::io::Result<Option<i32>>;
}

/// Spawns the configured executables as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tools: ToolPaths,
}

impl ProcessRunner {
    /// Runner using the resolved `tools`
    #[must_use]
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }
}

#[async_trait::async_trait]
impl UnitRunner for ProcessRunner {
    async fn run_unit(&self, unit: &WorkUnit, workdir: &Path) -> std::io::Result<Option<i32>> {
        let tool = unit.invocation.tool;
        let program = self.tools.get(tool).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no executable resolved for {tool}"),
            )
        })?;
        tracing::debug!(stage = %unit.stage, program = %program.display(), args = %unit.invocation, "spawning");
        let status = tokio::process::Command::new(program)
            .args(&unit.invocation.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .status()
            .await?;
        Ok(status.code())
    }
}

/// Outcome of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    /// Owning stage
    pub stage: StageKind,
    /// Tool that ran
    pub tool: Tool,
    /// Argument string
    pub invocation: String,
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Spawn or wait failure
    pub error: Option<String>,
    /// Whether the unit succeeded
    pub success: bool,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl UnitOutcome {
    fn new(unit: &WorkUnit, result: std::io::Result<Option<i32>>, elapsed: Duration) -> Self {
        let (exit_code, error) = match result {
            Ok(code) => (code, None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            stage: unit.stage,
            tool: unit.invocation.tool,
            invocation: unit.invocation.to_string(),
            exit_code,
            success: error.is_none() && exit_code == Some(0),
            error,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Outcomes of one wave
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaveReport {
    /// Wave position
    pub index: usize,
    /// Stages in the wave
    pub stages: Vec<StageKind>,
    /// One outcome per unit, in dispatch order
    pub outcomes: Vec<UnitOutcome>,
}

impl WaveReport {
    /// Failed outcomes
    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

/// Everything a local run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Working directory of every unit
    pub workspace: PathBuf,
    /// Completed waves, the last one possibly failed
    pub waves: Vec<WaveReport>,
}

impl RunReport {
    /// Every outcome across waves
    pub fn outcomes(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.waves.iter().flat_map(|w| w.outcomes.iter())
    }

    /// Whether every recorded unit succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes().all(|o| o.success)
    }

    /// Pretty JSON rendering
    ///
    /// # Errors
    /// Propagates `serde_json` errors.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON rendering to `path`
    ///
    /// # Errors
    /// `PipelineError::Io` on write failure.
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = self
            .to_json()
            .map_err(|e| PipelineError::io(path, std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }
}

/// Wave-barrier executor over a bounded worker pool
#[derive(Clone)]
pub struct LocalExecutor {
    runner: Arc<dyn UnitRunner>,
    workers: usize,
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl LocalExecutor {
    /// Executor spawning real processes
    ///
    /// Executables for `tools` are resolved here, before anything runs.
    ///
    /// # Errors
    /// `PipelineError::MissingExecutable` if a tool cannot be located.
    pub fn new(settings: &RexflowSettings, tools: &[Tool]) -> Result<Self, PipelineError> {
        let paths = ToolPaths::resolve(settings, tools)?;
        Ok(Self::with_runner(
            Arc::new(ProcessRunner::new(paths)),
            settings.worker_count(),
        ))
    }

    /// Executor with a custom unit runner
    #[must_use]
    pub fn with_runner(runner: Arc<dyn UnitRunner>, workers: usize) -> Self {
        Self {
            runner,
            workers: workers.max(1),
        }
    }

    /// Pool size
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every wave of `graph` with `workdir` as working directory
    ///
    /// # Errors
    /// `PipelineError::StageFailure` after the first wave with a failed unit.
    pub async fn run(&self, graph: &PipelineGraph, workdir: &Path) -> Result<RunReport, PipelineError> {
        let schedule = Schedule::from_graph(graph);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut report = RunReport {
            workspace: workdir.to_path_buf(),
            waves: Vec::with_capacity(schedule.waves().len()),
        };
        tracing::info!(
            waves = schedule.waves().len(),
            units = schedule.unit_count(),
            workers = self.workers,
            "starting local run"
        );

        for wave in schedule.waves() {
            tracing::info!(wave = wave.index, stages = ?wave.stages, units = wave.units.len(), "dispatching wave");
            let mut handles = Vec::with_capacity(wave.units.len());
            for unit in &wave.units {
                let runner = Arc::clone(&self.runner);
                let semaphore = Arc::clone(&semaphore);
                let dir = workdir.to_path_buf();
                let task_unit = unit.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let start = Instant::now();
                    let result = runner.run_unit(&task_unit, &dir).await;
                    UnitOutcome::new(&task_unit, result, start.elapsed())
                });
                handles.push((unit, handle));
            }

            let mut outcomes = Vec::with_capacity(handles.len());
            for (unit, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(join) => UnitOutcome::new(
                        unit,
                        Err(std::io::Error::other(join.to_string())),
                        Duration::ZERO,
                    ),
                };
                if !outcome.success {
                    tracing::error!(
                        stage = %outcome.stage,
                        invocation = %outcome.invocation,
                        exit_code = ?outcome.exit_code,
                        error = ?outcome.error,
                        "unit failed"
                    );
                }
                outcomes.push(outcome);
            }

            let wave_report = WaveReport {
                index: wave.index,
                stages: wave.stages.clone(),
                outcomes,
            };
            let mut failed_stages: Vec<StageKind> = wave_report.failures().map(|o| o.stage).collect();
            failed_stages.dedup();
            let failed = wave_report.failures().count();
            let total = wave_report.outcomes.len();
            report.waves.push(wave_report);

            if failed > 0 {
                tracing::error!(wave = wave.index, failed, total, "wave failed, stopping");
                return Err(PipelineError::StageFailure {
                    stages: failed_stages,
                    failed,
                    total,
                    report: Box::new(report),
                });
            }
            tracing::info!(wave = wave.index, "wave complete");
        }

        tracing::info!(units = schedule.unit_count(), "local run complete");
        Ok(report)
    }
}
