use anyhow::{Context, Result};
use cbam_canvas::FlowConfig;
use cbam_cli::commands;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn flow_arg() -> Arg {
    Arg::new("flow")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Exported flow JSON ({nodes, edges, metadata?, viewport?})")
}

fn cli() -> Command {
    Command::new("cbam-flow")
        .version(cbam_canvas::VERSION)
        .about("Inspect and analyse exported CBAM process flows")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .subcommand(
            Command::new("check")
                .about("Load the flow and report dropped or repaired records")
                .arg(flow_arg()),
        )
        .subcommand(
            Command::new("chains")
                .about("Detect process chains and their emissions")
                .arg(flow_arg()),
        )
        .subcommand(
            Command::new("layout")
                .about("Compute layered node positions")
                .arg(flow_arg()),
        )
        .subcommand(
            Command::new("rollup")
                .about("Sum CBAM metrics over a group's members")
                .arg(flow_arg())
                .arg(
                    Arg::new("group")
                        .long("group")
                        .required(true)
                        .help("Group node id"),
                ),
        )
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<FlowConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => FlowConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(FlowConfig::default()),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));
    let config = load_config(&matches)?;

    let Some((name, args)) = matches.subcommand() else {
        return Ok(());
    };
    let path = args
        .get_one::<PathBuf>("flow")
        .context("missing flow file")?;
    let snapshot = commands::read_flow(path)?;

    match name {
        "check" => {
            let report = commands::check(&snapshot);
            for issue in &report.issues {
                tracing::warn!(%issue, "record dropped");
            }
            print_json(&report)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        "chains" => {
            let report = commands::detect(&snapshot, &config);
            tracing::info!(
                chains = report.chains.len(),
                ambiguous = report.ambiguous.len(),
                "detection finished"
            );
            print_json(&report)?;
        }
        "layout" => print_json(&commands::layout(&snapshot, &config)?)?,
        "rollup" => {
            let group = args
                .get_one::<String>("group")
                .context("missing --group")?;
            print_json(&commands::rollup(&snapshot, group)?)?;
        }
        other => anyhow::bail!("unknown command {other}"),
    }
    Ok(())
}
