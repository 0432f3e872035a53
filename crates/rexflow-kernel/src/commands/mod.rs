//! Subcommand implementations

pub(crate) mod config;
pub(crate) mod holdout;
pub(crate) mod run;

use anyhow::Context;
use clap::ArgMatches;
use rexflow_kernel::{PipelineOptions, RexflowSettings, StepMask};
use std::path::PathBuf;

/// Settings from `--settings`, defaults otherwise
pub(crate) fn load_settings(args: &ArgMatches) -> anyhow::Result<RexflowSettings> {
    let path = args.get_one::<PathBuf>("settings");
    RexflowSettings::load(path.map(PathBuf::as_path)).context("loading settings")
}

pub(crate) fn strings(args: &ArgMatches, id: &str) -> Option<Vec<String>> {
    args.try_get_many::<String>(id)
        .ok()
        .flatten()
        .map(|values| values.cloned().collect())
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    args.try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

/// Directory given to `--copy-histograms`
pub(crate) fn histogram_source(args: &ArgMatches) -> Option<&PathBuf> {
    args.try_get_one::<PathBuf>("copy-histograms").ok().flatten()
}

/// Pipeline options from the run flags present on `args`
pub(crate) fn pipeline_options(args: &ArgMatches) -> PipelineOptions {
    let steps = args
        .try_get_one::<StepMask>("steps")
        .ok()
        .flatten()
        .copied()
        .unwrap_or_else(StepMask::all);
    let mut options = PipelineOptions::default()
        .with_steps(steps)
        .with_also_blind(flag(args, "and-blind"))
        .with_systematics(strings(args, "sys"))
        .with_regions(strings(args, "regions"))
        .with_granular_ntuple(flag(args, "granular"))
        .with_histograms_copied(histogram_source(args).is_some());
    options.exclude_validation_regions = !flag(args, "include-vr");
    options
}
