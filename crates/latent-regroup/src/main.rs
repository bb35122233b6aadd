use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use latent_regroup::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("latent-regroup")
        .version(latent_regroup::VERSION)
        .about(
            "Convert old per-scale latent .npz files into merged multi-resolution \
             SDXL latent .npz files with suffixed keys.",
        )
        .arg(
            Arg::new("src")
                .long("src")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory containing old latent files named like '<base>_<w>x<h>.npz'"),
        )
        .arg(
            Arg::new("dst")
                .long("dst")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory to write merged latent files"),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .action(ArgAction::SetTrue)
                .help("Overwrite existing output files. By default, existing outputs are skipped."),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Show planned output files without writing them."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the final report as JSON instead of per-file lines"),
        )
}

fn config_from(matches: &ArgMatches) -> anyhow::Result<ConvertConfig> {
    let src = matches
        .get_one::<PathBuf>("src")
        .context("--src is required")?;
    let dst = matches
        .get_one::<PathBuf>("dst")
        .context("--dst is required")?;

    Ok(ConvertConfig::new(src, dst)
        .with_overwrite(matches.get_flag("overwrite"))
        .with_dry_run(matches.get_flag("dry-run")))
}

fn execute(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = config_from(matches)?;
    let report = if matches.get_flag("json") {
        run(&config, &mut JsonReporter::stdout())
    } else {
        run(&config, &mut TextReporter::stdout())
    }
    .with_context(|| format!("conversion of {} failed", config.src.display()))?;

    tracing::debug!(
        "Finished: {} produced, {} skipped",
        report.produced(),
        report.skipped()
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match execute(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
