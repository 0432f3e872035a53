//! Run planning
//!
//! Ties a workspace, its configuration copy and the pipeline options into a
//! [`PreparedRun`] that either executor can take.

use crate::arguments::ArgumentBuilder;
use crate::dag::{PipelineGraph, PipelineOptions};
use crate::error::PipelineError;
use crate::settings::RexflowSettings;
use crate::types::Tool;
use crate::workspace::Workspace;
use rexflow_config::{BlockKind, Document, TitleMode};
use std::path::Path;

/// Workspace label of held-out systematic runs
pub const HOLDOUT_LABEL: &str = "holdout";

/// A workspace with the graph to run in it
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Where the run happens
    pub workspace: Workspace,
    /// Parsed configuration copy
    pub document: Document,
    /// Options the graph was built from, after histogram copying
    pub options: PipelineOptions,
    /// Stage graph
    pub graph: PipelineGraph,
}

impl PreparedRun {
    /// Plan a run inside an existing workspace
    ///
    /// With `histograms` set, every `*histos.root` file of that directory is
    /// copied into the workspace and histogram production is skipped.
    ///
    /// # Errors
    /// Configuration, copy or graph construction failures.
    pub fn plan(
        workspace: Workspace,
        options: &PipelineOptions,
        settings: &RexflowSettings,
        histograms: Option<&Path>,
    ) -> Result<Self, PipelineError> {
        let document = workspace.document()?;
        let mut options = options.clone();
        if let Some(source) = histograms {
            workspace.copy_histograms_from(source, document.job_name())?;
            options.histograms_copied = true;
        }

        let args = ArgumentBuilder::new(&document, workspace.config_path())
            .with_blind(settings.blind.clone());
        let graph = PipelineGraph::build(&args, &options)?;
        tracing::info!(
            workspace = %workspace.root().display(),
            steps = %options.steps,
            nodes = graph.node_count(),
            invocations = graph.invocation_count(),
            "planned run"
        );
        Ok(Self {
            workspace,
            document,
            options,
            graph,
        })
    }

    /// Create the workspace for `config` and plan a run in it
    ///
    /// # Errors
    /// `PipelineError::WorkspaceExists` and everything [`PreparedRun::plan`]
    /// returns.
    pub fn create(
        config: &Path,
        label: &str,
        suffix: Option<&str>,
        options: &PipelineOptions,
        settings: &RexflowSettings,
        histograms: Option<&Path>,
    ) -> Result<Self, PipelineError> {
        // parse before creating anything so a bad config leaves no directory
        Document::read(config)?;
        let workspace = Workspace::create(config, label, suffix)?;
        Self::plan(workspace, options, settings, histograms)
    }

    /// Build an executor for the tools the run needs, then create the run
    ///
    /// `executor` receives the tools required once histogram copying is
    /// accounted for. It runs before the workspace exists, so a missing
    /// executable leaves nothing behind.
    ///
    /// # Errors
    /// Whatever `executor` returns, then everything [`PreparedRun::create`]
    /// returns.
    pub fn create_with<E>(
        config: &Path,
        label: &str,
        suffix: Option<&str>,
        options: &PipelineOptions,
        settings: &RexflowSettings,
        histograms: Option<&Path>,
        executor: impl FnOnce(&[Tool]) -> Result<E, PipelineError>,
    ) -> Result<(E, Self), PipelineError> {
        let options = options
            .clone()
            .with_histograms_copied(options.histograms_copied || histograms.is_some());
        let executor = executor(&options.required_tools())?;
        let run = Self::create(config, label, suffix, &options, settings, histograms)?;
        Ok((executor, run))
    }
}

/// Plan one run per held-out systematic
///
/// Each run gets its own workspace `<stem>.holdout.<S>.d` whose configuration
/// lacks systematic `S`. Without `held_out`, every systematic is held out in
/// turn; unknown titles are skipped with a warning.
///
/// # Errors
/// As [`PreparedRun::plan`], plus `PipelineError::WorkspaceExists`.
pub fn plan_holdouts(
    config: &Path,
    held_out: Option<&[String]>,
    options: &PipelineOptions,
    settings: &RexflowSettings,
    histograms: Option<&Path>,
) -> Result<Vec<PreparedRun>, PipelineError> {
    let document = Document::read(config)?;
    let known = document.titles(BlockKind::Systematic, TitleMode::Unique);
    let selected: Vec<String> = match held_out {
        None => known,
        Some(list) => list
            .iter()
            .filter(|s| {
                let present = known.contains(s);
                if !present {
                    tracing::warn!(systematic = %s, "unknown systematic, not held out");
                }
                present
            })
            .cloned()
            .collect(),
    };

    let mut runs = Vec::with_capacity(selected.len());
    for systematic in &selected {
        let dir = Workspace::path_for(config, HOLDOUT_LABEL, Some(systematic));
        let reduced = document.drop_systematics(std::slice::from_ref(systematic));
        let workspace = Workspace::create_with_document(&dir, &reduced)?;
        runs.push(PreparedRun::plan(workspace, options, settings, histograms)?);
    }
    tracing::info!(runs = runs.len(), "planned held-out systematic runs");
    Ok(runs)
}
