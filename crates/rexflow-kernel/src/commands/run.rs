//! `rexflow run local|condor`

use anyhow::Context;
use clap::ArgMatches;
use rexflow_kernel::executor::REPORT_FILE;
use rexflow_kernel::{BatchExecutor, LocalExecutor, PipelineError, PreparedRun, RunReport};
use std::path::{Path, PathBuf};

pub(crate) async fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    match args.subcommand() {
        Some(("local", sub)) => local(sub).await,
        Some(("condor", sub)) => condor(sub).await,
        _ => Ok(()),
    }
}

struct RunInputs<'a> {
    config: &'a Path,
    suffix: Option<&'a str>,
    histograms: Option<&'a Path>,
}

fn inputs(args: &ArgMatches) -> anyhow::Result<RunInputs<'_>> {
    Ok(RunInputs {
        config: args
            .get_one::<PathBuf>("config")
            .context("missing configuration argument")?,
        suffix: args.get_one::<String>("suffix").map(String::as_str),
        histograms: super::histogram_source(args).map(PathBuf::as_path),
    })
}

async fn local(args: &ArgMatches) -> anyhow::Result<()> {
    let mut settings = super::load_settings(args)?;
    if let Some(workers) = args.get_one::<usize>("workers") {
        settings = settings.with_workers(*workers);
    }
    let options = super::pipeline_options(args);
    let inputs = inputs(args)?;

    let (executor, run) = PreparedRun::create_with(
        inputs.config,
        "local",
        inputs.suffix,
        &options,
        &settings,
        inputs.histograms,
        |tools| LocalExecutor::new(&settings, tools),
    )?;
    let report_path = run.workspace.root().join(REPORT_FILE);

    match executor.run(&run.graph, run.workspace.root()).await {
        Ok(report) => {
            report.write_json(&report_path)?;
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            if let PipelineError::StageFailure { report, .. } = &err {
                report.write_json(&report_path)?;
                print_report(report);
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &RunReport) {
    let total = report.outcomes().count();
    let failed = report.outcomes().filter(|o| !o.success).count();
    println!(
        "{} units run in {} waves, {} failed; report in {}",
        total,
        report.waves.len(),
        failed,
        report.workspace.join(REPORT_FILE).display()
    );
}

async fn condor(args: &ArgMatches) -> anyhow::Result<()> {
    let settings = super::load_settings(args)?;
    let options = super::pipeline_options(args);
    let inputs = inputs(args)?;

    let submit = args.get_flag("submit");
    let (executor, run) = PreparedRun::create_with(
        inputs.config,
        "condor",
        inputs.suffix,
        &options,
        &settings,
        inputs.histograms,
        |tools| {
            let executor = BatchExecutor::new(&settings, tools)?;
            if submit {
                executor.with_submission()
            } else {
                Ok(executor)
            }
        },
    )?;
    let dag = executor.render(&run.graph, run.workspace.root())?;
    let dag_file = executor.write(&dag)?;
    println!("{}", dag_file.display());

    if submit {
        executor.submit(&dag_file).await?;
    }
    Ok(())
}
