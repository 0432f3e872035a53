//! rexflow kernel
//!
//! Builds and runs the stage pipeline of a fit configuration:
//!
//! 1. **Arguments**: [`ArgumentBuilder`] derives every invocation from the
//!    parsed configuration
//! 2. **Graph**: [`PipelineGraph`] wires stage nodes by rank
//! 3. **Execution**: [`LocalExecutor`] runs waves on a bounded process pool,
//!    [`BatchExecutor`] renders an HTCondor DAG instead
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rexflow_kernel::prelude::*;
//!
//! let settings = RexflowSettings::load(None)?;
//! let options = PipelineOptions::default().with_steps("n,wf,dp".parse()?);
//! let executor = LocalExecutor::new(&settings, &options.required_tools())?;
//!
//! let run = PreparedRun::create(Path::new("tW.conf"), "local", None, &options, &settings, None)?;
//! let report = executor.run(&run.graph, run.workspace.root()).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod arguments;
pub mod batch;
pub mod dag;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod settings;
pub mod types;
pub mod workspace;

pub use arguments::ArgumentBuilder;
pub use batch::BatchExecutor;
pub use dag::{PipelineGraph, PipelineOptions, StageNode};
pub use error::*;
pub use executor::{LocalExecutor, RunReport, UnitRunner};
pub use pipeline::{plan_holdouts, PreparedRun};
pub use settings::RexflowSettings;
pub use types::*;
pub use workspace::Workspace;

/// Common imports
pub mod prelude {
    pub use crate::arguments::{ArgumentBuilder, GranularNtuple};
    pub use crate::batch::{BatchExecutor, CondorDag, CondorJob};
    pub use crate::dag::{PipelineGraph, PipelineOptions, StageNode};
    pub use crate::error::{GraphError, PipelineError, SettingsError};
    pub use crate::executor::{LocalExecutor, ProcessRunner, RunReport, UnitOutcome, UnitRunner, WaveReport};
    pub use crate::pipeline::{plan_holdouts, PreparedRun};
    pub use crate::scheduler::{Schedule, Wave, WorkUnit};
    pub use crate::settings::{BlindSettings, CondorSettings, RexflowSettings, ToolPaths};
    pub use crate::types::{Invocation, StageKind, Step, StepMask, Tool, Variant};
    pub use crate::workspace::Workspace;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
