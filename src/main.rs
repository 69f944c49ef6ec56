//! ircprobe - conformance and resilience harness for IRC servers
//!
//! ## Modes
//!
//! **Default** (no subcommand, or `ircprobe run`): builds the standard
//! catalog, runs it against the configured server one scenario at a time,
//! and prints a verdict per scenario plus totals.
//!
//! **`ircprobe list`**: prints the catalog without touching the network.
//!
//! **`ircprobe config`**: prints the effective configuration, or saves it
//! with `--write` as a starting point for a config file.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser as ClapParser, Subcommand};
use ircprobe::{
    catalog,
    config::{self, ConfigError, HarnessConfig},
    console::Console,
    registry::{Namer, Registry},
    runner::{RunReport, Runner},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ircprobe - conformance and resilience harness for IRC servers
///
/// Connects to a running IRC server, drives scripted exchanges, and checks
/// numeric replies, error codes and survival under hostile input.
#[derive(ClapParser, Debug)]
#[command(name = "ircprobe", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (default: <config dir>/ircprobe/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host of the server under test
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port of the server under test
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Shared registration password sent with PASS
    #[arg(long, env = "IRCPROBE_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Only run scenarios whose name or group contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Also run slow scenarios (registration timeout waits)
    #[arg(long)]
    include_slow: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Exit with status 1 when any scenario failed
    #[arg(long)]
    strict: bool,

    /// Seed for generated payloads (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the catalog against the server (the default)
    Run(RunArgs),

    /// List scenarios without running them
    List {
        /// Only list scenarios whose name or group contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Save the effective configuration to this path instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report error: {0:#}")]
    Report(#[source] anyhow::Error),
}

#[tokio::main]
async fn main() -> Result<ExitCode, HarnessError> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Run(args)) => run(config, args).await,
        Some(Commands::List { filter }) => list(&config, filter.as_deref()),
        Some(Commands::Config { write }) => show_config(&config, write.as_deref()),
        None => run(config, cli.run).await,
    }
}

/// Tracing goes to stderr; stdout carries the report.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ircprobe=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Config file first, then command-line and environment overrides.
fn load_config(cli: &Cli) -> Result<HarnessConfig, HarnessError> {
    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = match HarnessConfig::load(&path)? {
        Some(config) => {
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => {
            if cli.config.is_some() {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
            }
            HarnessConfig::default()
        }
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(password) = &cli.password {
        config.server.password = password.clone();
    }
    Ok(config)
}

fn build_registry(config: &HarnessConfig, filter: Option<&str>, include_slow: bool) -> Registry {
    let namer = Namer::new(config.run.unique_names);
    let seed = config.run.seed.unwrap_or_else(rand::random);
    tracing::info!(seed, suffix = namer.suffix(), "building catalog");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut registry = catalog::standard(&namer, &config.server.password, &mut rng);
    if !include_slow {
        registry = registry.without_slow();
    }
    if let Some(pattern) = filter {
        registry = registry.filter(pattern);
    }
    registry
}

// ── Run ────────────────────────────────────────────────────────────

async fn run(mut config: HarnessConfig, args: RunArgs) -> Result<ExitCode, HarnessError> {
    if args.include_slow {
        config.run.include_slow = true;
    }
    if args.seed.is_some() {
        config.run.seed = args.seed;
    }

    let registry = build_registry(&config, args.filter.as_deref(), config.run.include_slow);
    let target = config.server.endpoint();
    let runner = Runner::new(Arc::new(config));

    // First Ctrl+C lets the current scenario finish, then stops the run.
    let cancel = runner.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, stopping after the current scenario");
            cancel.cancel();
        }
    });

    let color = !args.no_color && std::io::stdout().is_terminal();
    let mut console = Console::new(std::io::stdout(), color);
    console.banner(&target, registry.len())?;

    let report = runner
        .run(&registry, |outcome| {
            if let Err(e) = console.outcome(outcome) {
                tracing::warn!(error = %e, "failed to print outcome");
            }
        })
        .await;
    ctrl_c.abort();

    console.summary(&report)?;

    if let Some(path) = &args.json {
        write_report(path, &report).map_err(HarnessError::Report)?;
        tracing::info!(path = %path.display(), "report written");
    }

    if args.strict && report.failed() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ── List / Config ──────────────────────────────────────────────────

fn list(config: &HarnessConfig, filter: Option<&str>) -> Result<ExitCode, HarnessError> {
    let registry = build_registry(config, filter, true);
    let mut console = Console::new(std::io::stdout(), false);
    console.listing(&registry)?;
    Ok(ExitCode::SUCCESS)
}

fn show_config(config: &HarnessConfig, write: Option<&Path>) -> Result<ExitCode, HarnessError> {
    match write {
        Some(path) => {
            config.save(path)?;
            tracing::info!(path = %path.display(), "config written");
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(ExitCode::SUCCESS)
}
