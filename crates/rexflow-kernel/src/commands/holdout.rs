//! `rexflow sysholdout`

use anyhow::Context;
use clap::ArgMatches;
use rexflow_kernel::{plan_holdouts, BatchExecutor};
use std::path::PathBuf;

pub(crate) async fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let settings = super::load_settings(args)?;
    let options = super::pipeline_options(args);
    let config = args
        .get_one::<PathBuf>("config")
        .context("missing configuration argument")?;
    let held_out = super::strings(args, "sys");
    let histograms = super::histogram_source(args);
    let submit = args.get_flag("submit");

    let mut executor = BatchExecutor::new(&settings, &options.required_tools())?;
    if submit {
        executor = executor.with_submission()?;
    }
    let runs = plan_holdouts(
        config,
        held_out.as_deref(),
        &options.with_systematics(None),
        &settings,
        histograms.map(PathBuf::as_path),
    )?;

    for run in &runs {
        let dag = executor.render(&run.graph, run.workspace.root())?;
        let dag_file = executor.write(&dag)?;
        println!("{}", dag_file.display());
        if submit {
            executor.submit(&dag_file).await?;
        }
    }
    Ok(())
}
