use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orgsync::report::EXIT_FATAL;
use orgsync::{
    Config, ExclusionSet, GitCli, GitHubClient, RepoSynchronizer, Reporter, SyncEngine,
};

#[derive(Parser)]
#[command(name = "orgsync")]
#[command(about = "Clone and update every repository of a GitHub organization")]
#[command(version)]
struct Cli {
    /// GitHub organization whose repositories are synchronized
    organization: String,

    /// Verbose logging and visible git output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of repositories synchronized at once
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: Option<u16>,

    /// Repository name to skip (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,

    /// Show what would be cloned or pulled without touching any repository
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_FATAL)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if let Err(e) = init_logging(cli.verbose, &config.logging.level) {
        eprintln!("❌ {:#}", e);
        return ExitCode::from(EXIT_FATAL);
    }
    info!("Starting orgsync v{}", env!("CARGO_PKG_VERSION"));

    match run(cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Initialize logging: `RUST_LOG`, then `--verbose`, then the configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid logging level: {:?}", level))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration and apply environment and command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    config.apply_env_overrides()?;
    if let Some(jobs) = cli.jobs {
        config.sync.max_parallel = usize::from(jobs);
    }

    Ok(config)
}

async fn run(cli: Cli, config: Config) -> Result<u8> {
    // Credential first: nothing is created without it
    let token = GitHubClient::token_from_env(&config)?;

    let git = GitCli::new(cli.verbose);
    let version = git.version().await?;
    debug!("Using {}", version);

    let root = config.working_root(&cli.organization);
    if !cli.dry_run {
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create working directory: {}", root.display()))?;
    }
    info!("Working root: {}", root.display());

    let lister = GitHubClient::new(&config, &cli.organization, token)?;
    let exclusions = ExclusionSet::new(config.exclude.iter().chain(cli.exclude.iter()).cloned());
    let synchronizer = RepoSynchronizer::new(git, root, config.sync.branches.clone());

    let engine = SyncEngine::new(
        Arc::new(synchronizer),
        exclusions,
        config.sync.max_parallel,
        config.operation_timeout(),
    );

    println!("🔍 Discovering repositories of {}...", lister.organization());

    if cli.dry_run {
        let plan = engine.plan(&lister).await?;
        Reporter::render_plan(&plan, &mut io::stdout().lock())?;
        return Ok(0);
    }

    let report = engine.run(&lister).await?;
    Reporter::render(&report, &mut io::stdout().lock())?;
    Reporter::render_errors(&report, &mut io::stderr().lock())?;

    Ok(Reporter::exit_code(&report))
}
