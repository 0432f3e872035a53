//! `rexflow` command line

mod commands;

use clap::{value_parser, Arg, ArgAction, Command};
use rexflow_kernel::StepMask;
use std::path::PathBuf;

fn config_arg() -> Arg {
    Arg::new("config")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Fit configuration file")
}

fn output_arg() -> Arg {
    Arg::new("new")
        .short('n')
        .long("new")
        .value_parser(value_parser!(PathBuf))
        .help("Write the result here instead of editing in place")
}

fn list_arg(name: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(long)
        .value_delimiter(',')
        .action(ArgAction::Append)
        .help(help)
}

fn pipeline_args(cmd: Command, default_steps: &'static str) -> Command {
    cmd.arg(config_arg())
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .help("Suffix appended to the workspace name"),
        )
        .arg(
            Arg::new("and-blind")
                .long("and-blind")
                .action(ArgAction::SetTrue)
                .help("Also run blind (Asimov) variants of fit-dependent stages"),
        )
        .arg(
            Arg::new("steps")
                .long("steps")
                .default_value(default_steps)
                .value_parser(value_parser!(StepMask))
                .help("Comma separated steps among n, wf, dp, r, i (or all)"),
        )
        .arg(list_arg("sys", "sys", "Restrict to these systematics"))
        .arg(list_arg("regions", "regions", "Restrict histogram production to these regions"))
        .arg(
            Arg::new("copy-histograms")
                .long("copy-histograms")
                .value_parser(value_parser!(PathBuf))
                .help("Copy *histos.root files from this directory and skip histogram production"),
        )
        .arg(
            Arg::new("granular")
                .long("granular")
                .action(ArgAction::SetTrue)
                .help("One histogram job per region and systematic, merged afterwards"),
        )
        .arg(
            Arg::new("include-vr")
                .long("include-vr")
                .action(ArgAction::SetTrue)
                .help("Fit validation regions too"),
        )
}

fn submit_arg() -> Arg {
    Arg::new("submit")
        .long("submit")
        .action(ArgAction::SetTrue)
        .help("Submit the DAG after writing it")
}

fn cli() -> Command {
    Command::new("rexflow")
        .version(rexflow_kernel::VERSION)
        .about("Orchestrate multi-stage fit pipelines locally or on HTCondor")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("settings")
                .long("settings")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (TOML)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter, overrides RUST_LOG"),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect and edit fit configurations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("gen")
                        .about("Generate a configuration from a TOML layout")
                        .arg(
                            Arg::new("out")
                                .required(true)
                                .value_parser(value_parser!(PathBuf))
                                .help("Output configuration file"),
                        )
                        .arg(
                            Arg::new("layout")
                                .long("layout")
                                .required(true)
                                .value_parser(value_parser!(PathBuf))
                                .help("Layout file"),
                        )
                        .arg(
                            Arg::new("drop-region")
                                .long("drop-region")
                                .action(ArgAction::Append)
                                .help("Region to drop after generation"),
                        )
                        .arg(
                            Arg::new("drop-sys")
                                .long("drop-sys")
                                .action(ArgAction::Append)
                                .help("Systematic to drop after generation"),
                        ),
                )
                .subcommand(
                    Command::new("rm-region")
                        .about("Drop regions and the systematics mentioning them")
                        .arg(config_arg())
                        .arg(
                            Arg::new("region")
                                .short('r')
                                .long("region")
                                .required(true)
                                .action(ArgAction::Append)
                                .help("Region to drop"),
                        )
                        .arg(output_arg()),
                )
                .subcommand(
                    Command::new("rm-sys")
                        .about("Drop systematics")
                        .arg(config_arg())
                        .arg(
                            Arg::new("sys")
                                .short('s')
                                .long("sys")
                                .required(true)
                                .action(ArgAction::Append)
                                .help("Systematic to drop"),
                        )
                        .arg(output_arg()),
                )
                .subcommand(
                    Command::new("unblind")
                        .about("Turn FitBlind: TRUE into FitBlind: FALSE")
                        .arg(config_arg())
                        .arg(output_arg()),
                )
                .subcommand(
                    Command::new("toggle-asimov")
                        .about("Flip between Asimov and observed-data fits")
                        .arg(config_arg())
                        .arg(output_arg()),
                )
                .subcommand(
                    Command::new("summary")
                        .about("List regions, systematics and impact groups")
                        .arg(config_arg())
                        .arg(
                            Arg::new("json")
                                .long("json")
                                .action(ArgAction::SetTrue)
                                .help("Output as JSON"),
                        ),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run a pipeline")
                .subcommand_required(true)
                .subcommand(
                    pipeline_args(Command::new("local").about("Run on this host"), "all").arg(
                        Arg::new("workers")
                            .long("workers")
                            .value_parser(value_parser!(usize))
                            .help("Concurrent processes (default: host parallelism)"),
                    ),
                )
                .subcommand(
                    pipeline_args(
                        Command::new("condor").about("Render an HTCondor DAG"),
                        "all",
                    )
                    .arg(submit_arg()),
                ),
        )
        .subcommand(
            Command::new("sysholdout")
                .about("Render one DAG per held-out systematic")
                .arg(config_arg())
                .arg(
                    Arg::new("sys")
                        .short('s')
                        .long("sys")
                        .action(ArgAction::Append)
                        .help("Systematic to hold out (default: every systematic)"),
                )
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .default_value("wf")
                        .value_parser(value_parser!(StepMask))
                        .help("Comma separated steps among n, wf, dp, r, i (or all)"),
                )
                .arg(
                    Arg::new("copy-histograms")
                        .long("copy-histograms")
                        .value_parser(value_parser!(PathBuf))
                        .help("Copy *histos.root files from this directory into every workspace"),
                )
                .arg(submit_arg()),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    rexflow_kernel::logging::init(matches.get_one::<String>("log-level").map(String::as_str));

    let result = match matches.subcommand() {
        Some(("config", args)) => commands::config::execute(args),
        Some(("run", args)) => commands::run::execute(args).await,
        Some(("sysholdout", args)) => commands::holdout::execute(args).await,
        _ => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexflow_kernel::Tool;

    #[test]
    fn cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn run_local_parses_flags() {
        let matches = cli()
            .try_get_matches_from([
                "rexflow", "run", "local", "tW.conf", "--steps", "n,wf", "--sys", "a,b", "--sys",
                "c", "--and-blind", "--workers", "4",
            ])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        let (name, local) = run.subcommand().unwrap();
        assert_eq!(name, "local");
        let options = commands::pipeline_options(local);
        assert_eq!(options.steps, "n,wf".parse::<StepMask>().unwrap());
        assert_eq!(
            options.systematics,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(options.also_blind);
        assert_eq!(local.get_one::<usize>("workers"), Some(&4));
    }

    #[test]
    fn copied_histograms_drop_the_merge_tool() {
        let matches = cli()
            .try_get_matches_from([
                "rexflow", "run", "local", "tW.conf", "--granular", "--copy-histograms", "/prev",
            ])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        let (_, local) = run.subcommand().unwrap();
        let options = commands::pipeline_options(local);
        assert!(options.histograms_copied);
        assert_eq!(options.required_tools(), vec![Tool::Fitter]);

        let matches = cli()
            .try_get_matches_from(["rexflow", "run", "condor", "tW.conf", "--granular"])
            .unwrap();
        let (_, run) = matches.subcommand().unwrap();
        let (_, condor) = run.subcommand().unwrap();
        assert_eq!(
            commands::pipeline_options(condor).required_tools(),
            vec![Tool::Fitter, Tool::Merger]
        );
    }

    const EDITED: &str = "Job: \"tW\"\n  FitBlind: TRUE\n\nRegion: \"reg1j1b\"\n\n\
Region: \"reg2j1b\"\n\nSystematic: \"JET_JER\"\n\nSystematic: \"tW_DRDS\"\n";

    fn run_config(argv: &[&str]) {
        let matches = cli().try_get_matches_from(argv).unwrap();
        let (_, config) = matches.subcommand().unwrap();
        commands::config::execute(config).unwrap();
    }

    #[test]
    fn config_edits_in_place_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tW.conf");
        let file = path.to_str().unwrap();

        std::fs::write(&path, EDITED).unwrap();
        run_config(&["rexflow", "config", "rm-region", file, "-r", "reg1j1b"]);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("reg1j1b"));
        assert!(text.contains("reg2j1b"));

        run_config(&["rexflow", "config", "rm-sys", file, "-s", "JET_JER"]);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("JET_JER"));
        assert!(text.contains("tW_DRDS"));

        run_config(&["rexflow", "config", "unblind", file]);
        assert!(std::fs::read_to_string(&path).unwrap().contains("FitBlind: FALSE"));
    }

    #[test]
    fn config_edits_leave_the_source_with_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tW.conf");
        let out = dir.path().join("out.conf");
        let (file, new) = (path.to_str().unwrap(), out.to_str().unwrap());
        std::fs::write(&path, EDITED).unwrap();

        run_config(&["rexflow", "config", "rm-region", file, "-r", "reg1j1b", "-n", new]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), EDITED);
        assert!(!std::fs::read_to_string(&out).unwrap().contains("reg1j1b"));

        run_config(&["rexflow", "config", "rm-sys", file, "-s", "tW_DRDS", "-n", new]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), EDITED);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(!text.contains("tW_DRDS"));
        assert!(text.contains("reg1j1b"));

        run_config(&["rexflow", "config", "unblind", file, "-n", new]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), EDITED);
        assert!(std::fs::read_to_string(&out).unwrap().contains("FitBlind: FALSE"));
    }

    #[test]
    fn bad_steps_are_rejected() {
        assert!(cli()
            .try_get_matches_from(["rexflow", "run", "condor", "tW.conf", "--steps", "fit"])
            .is_err());
    }
}
