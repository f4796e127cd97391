use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use qtbundle::{cleanup, deploy, AuditOutcome, ConfigFile};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Bundle a Qt application with its libraries and package it for distribution.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "qtbundle")]
struct CliArgs {
    /// Version of the application; overrides the configuration file
    #[arg(short = 'v', long = "app-version")]
    app_version: Option<String>,

    /// Deploy the application to the output directory
    #[arg(long)]
    deploy: bool,

    /// Remove the created files afterwards
    #[arg(long)]
    clean: bool,

    /// Increase log output (-d debug, -dd trace)
    #[arg(short, long, action = ArgAction::Count)]
    debug: u8,

    /// Configuration file
    config: PathBuf,
}

fn init_logging(verbosity: u8) {
    let level_filter = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("QTBUNDLE_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn run(args: &CliArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let plan = ConfigFile::load(&args.config)?
        .into_plan(args.app_version.as_deref(), &cwd)
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;

    info!(
        "{} for {}: {} libraries, {} platform plugins, {} plugin dirs, {} QML modules",
        plan.name,
        plan.platform,
        plan.dependencies.len(),
        plan.platform_plugins.len(),
        plan.toolkit_plugins.len(),
        plan.qml_modules.len()
    );

    if args.deploy {
        let deployment = deploy(&plan)?;
        if let AuditOutcome::Completed(report) = &deployment.audit {
            info!("{} NEEDED libraries resolve from the host", report.host.len());
        }
        info!(
            "Deployed {} ({} entries)",
            deployment.archive.display(),
            deployment.archived_entries
        );
    }

    if args.clean {
        cleanup(&plan)?;
    }

    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    init_logging(args.debug);

    if let Err(e) = run(&args) {
        error!("{e:#}");
        process::exit(1);
    }
}
