use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sifter_core::config::AppConfig;
use sifter_core::event::EventBus;
use sifter_core::types::JobEvent;
use sifter_gateway::GatewayServer;
use sifter_pipeline::{build_graph, JobRunner, RunLog};
use sifter_sources::Sources;

#[derive(Parser)]
#[command(
    name = "sifter",
    version,
    about = "Literature mining pipeline for drug target discovery"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sifter.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Run a single query and print its events
    Run {
        /// The research query
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Show the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sifter=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "sifter", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let sources = Sources::from_config(&config);
    let graph = Arc::new(build_graph(&sources, &config.pipeline)?);
    let event_bus = Arc::new(EventBus::new());
    let runner = JobRunner::new(graph, config.pipeline.clone(), event_bus.clone());

    let cancel = CancellationToken::new();
    let run_log = if config.log.enabled {
        let log = RunLog::new(&config.log_dir());
        info!(path = %log.path().display(), "Writing run log");
        Some(tokio::spawn(log.run(event_bus.tap(), cancel.clone())))
    } else {
        None
    };

    let outcome = match cli.command {
        Commands::Serve => {
            info!(bind = %config.gateway.bind, "Starting gateway");
            let server = GatewayServer::new(config.gateway.clone(), runner);
            let shutdown = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                shutdown.cancel();
            });

            server.run(cancel.clone()).await
        }
        Commands::Run { query } => run_once(&runner, &query.join(" ")).await,
        Commands::Config | Commands::Completions { .. } => Ok(()),
    };

    cancel.cancel();
    if let Some(handle) = run_log {
        handle.await.ok();
    }
    outcome
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    warn!(path = %path.display(), "No config file found, using defaults");
    let config = AppConfig::default();
    config.validate()?;
    Ok(config)
}

/// Submit one job and print its events until it completes.
async fn run_once(runner: &JobRunner, query: &str) -> anyhow::Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let (job_id, mut events) = runner.submit_and_subscribe(query);
    println!("job {}", job_id);

    let mut failure = None;
    while let Some(envelope) = events.recv().await {
        match envelope.event {
            JobEvent::Started => println!("[started]"),
            JobEvent::Progress { node, detail, step } => {
                println!("[{:>3}] {:<9} {}", step, node, detail)
            }
            JobEvent::Results { items } => {
                println!("\n{} candidate(s):", items.len());
                for c in &items {
                    let accession = c.accession_id.as_deref().unwrap_or("-");
                    println!("  {:<20} {:<28} {:<12} {}", c.name, c.organism, accession, c.source_article);
                }
            }
            JobEvent::Error { message } => {
                eprintln!("[error] {}", message);
                failure = Some(message);
            }
            JobEvent::Complete => println!("[complete]"),
        }
    }

    match failure {
        Some(message) => anyhow::bail!("job {} failed: {}", job_id, message),
        None => Ok(()),
    }
}
