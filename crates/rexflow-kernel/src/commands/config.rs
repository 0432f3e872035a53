//! `rexflow config ...`

use anyhow::Context;
use clap::ArgMatches;
use rexflow_config::{toggle_asimov, unblind, AsimovState, BlockKind, Document, Layout, TitleMode};
use rexflow_kernel::ArgumentBuilder;
use std::path::{Path, PathBuf};

pub(crate) fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    match args.subcommand() {
        Some(("gen", sub)) => generate(sub),
        Some(("rm-region", sub)) => edit(sub, |doc| {
            let regions = super::strings(sub, "region").unwrap_or_default();
            regions.iter().fold(doc, |doc, region| doc.drop_region(region))
        }),
        Some(("rm-sys", sub)) => edit(sub, |doc| {
            let systematics = super::strings(sub, "sys").unwrap_or_default();
            doc.drop_systematics(&systematics)
        }),
        Some(("unblind", sub)) => unblind_file(sub),
        Some(("toggle-asimov", sub)) => edit(sub, |doc| {
            let (doc, state) = toggle_asimov(&doc);
            match state {
                AsimovState::Asimov => tracing::info!("configuration now blind (Asimov)"),
                AsimovState::Observed => tracing::info!("configuration now fits observed data"),
            }
            doc
        }),
        Some(("summary", sub)) => summary(sub),
        _ => Ok(()),
    }
}

fn config_path(args: &ArgMatches) -> anyhow::Result<&PathBuf> {
    args.get_one::<PathBuf>("config")
        .context("missing configuration argument")
}

fn target_path<'a>(args: &'a ArgMatches, config: &'a Path) -> &'a Path {
    args.get_one::<PathBuf>("new")
        .map_or(config, PathBuf::as_path)
}

fn edit(args: &ArgMatches, apply: impl FnOnce(Document) -> Document) -> anyhow::Result<()> {
    let config = config_path(args)?;
    let doc = Document::read(config)
        .with_context(|| format!("reading {}", config.display()))?;
    let edited = apply(doc);
    let target = target_path(args, config);
    edited
        .write(target)
        .with_context(|| format!("writing {}", target.display()))?;
    tracing::info!(path = %target.display(), blocks = edited.len(), "configuration written");
    Ok(())
}

fn unblind_file(args: &ArgMatches) -> anyhow::Result<()> {
    let config = config_path(args)?;
    let text = std::fs::read_to_string(config)
        .with_context(|| format!("reading {}", config.display()))?;
    let target = target_path(args, config);
    std::fs::write(target, unblind(&text))
        .with_context(|| format!("writing {}", target.display()))?;
    Ok(())
}

fn generate(args: &ArgMatches) -> anyhow::Result<()> {
    let layout_path = args
        .get_one::<PathBuf>("layout")
        .context("missing --layout")?;
    let out = args.get_one::<PathBuf>("out").context("missing output path")?;

    let layout = Layout::read(layout_path)
        .with_context(|| format!("reading layout {}", layout_path.display()))?;
    let mut doc = layout.generate().context("generating configuration")?;
    for region in super::strings(args, "drop-region").unwrap_or_default() {
        doc = doc.drop_region(&region);
    }
    if let Some(systematics) = super::strings(args, "drop-sys") {
        doc = doc.drop_systematics(&systematics);
    }
    doc.write(out)
        .with_context(|| format!("writing {}", out.display()))?;
    tracing::info!(path = %out.display(), blocks = doc.len(), "configuration generated");
    Ok(())
}

fn summary(args: &ArgMatches) -> anyhow::Result<()> {
    let config = config_path(args)?;
    let doc = Document::read(config)
        .with_context(|| format!("reading {}", config.display()))?;
    let builder = ArgumentBuilder::new(&doc, config.clone());
    let regions = builder.regions();
    let fit_regions = builder.fit_regions();
    let systematics = doc.titles(BlockKind::Systematic, TitleMode::Unique);
    let groups = builder.impact_groups();

    if args.get_flag("json") {
        let value = serde_json::json!({
            "job": doc.job_name(),
            "blind": doc.is_blind(),
            "regions": regions,
            "fit_regions": fit_regions,
            "systematics": systematics,
            "impact_groups": groups,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Job: {}", doc.job_name());
        println!("Blind: {}", doc.is_blind());
        println!("Regions ({}): {}", regions.len(), regions.join(", "));
        println!("Fit regions ({}): {}", fit_regions.len(), fit_regions.join(", "));
        println!("Systematics ({}): {}", systematics.len(), systematics.join(", "));
        println!("Impact groups: {}", groups.join(", "));
    }
    Ok(())
}
