//! dca - Recurring DCA swap schedules behind an HTTP API.
//!
//! Usage:
//!   dca serve [--config dca.yaml]          Run the API and the dispatcher
//!   dca validate --config dca.yaml         Validate a configuration file
//!   dca list --config dca.yaml --wallet W  List a wallet's schedules

use clap::{Parser, Subcommand};
use dca::api::{self, ApiConfig, CorsSettings};
use dca::config::{StorageConfig, YamlLoader};
use dca::{
    DcaJobManager, Dispatcher, DryRunExecutor, InMemoryStorage, JobStore, ServiceConfig,
    WalletAddress,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// dca - Recurring dollar-cost-average swap schedules
#[derive(Parser)]
#[command(name = "dca")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the dispatcher
    Serve {
        /// Path to the YAML configuration file (defaults apply when omitted)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Host to bind to (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve the API without executing due jobs
        #[arg(long)]
        no_dispatcher: bool,
    },

    /// Validate a configuration file without running
    Validate {
        /// Path to the YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// List the schedules owned by a wallet
    List {
        /// Path to the YAML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Wallet address
        #[arg(short, long)]
        wallet: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            no_dispatcher,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_dispatcher {
                config.dispatcher.enabled = false;
            }
            with_store(&config, Command::Serve).await?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::List { config, wallet } => {
            let config = load_config(config.as_ref())?;
            let wallet = WalletAddress::new(&wallet)?;
            with_store(&config, Command::List(wallet)).await?;
        }
    }

    Ok(())
}

/// What to run once the store is open.
enum Command {
    Serve,
    List(WalletAddress),
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(YamlLoader::load_config(path)?)
        }
        None => Ok(ServiceConfig::default()),
    }
}

/// Open the configured store, run the command, then close the store.
async fn with_store(
    config: &ServiceConfig,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = config.storage.on_unique_conflict;

    match config.storage.backend() {
        StorageConfig::Memory => {
            info!("Using in-memory storage (schedules are lost on exit)");
            let store = Arc::new(InMemoryStorage::with_conflict_policy(policy));
            run_command(store, config, command).await
        }
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("Using SQLite storage at {}", path);
            let store = Arc::new(dca::SqliteStorage::new(path).await?.with_conflict_policy(policy));
            let result = run_command(Arc::clone(&store), config, command).await;
            store.close().await;
            result
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => {
            Err("sqlite storage requested but dca was built without the `sqlite` feature".into())
        }
    }
}

async fn run_command<S: JobStore + 'static>(
    store: Arc<S>,
    config: &ServiceConfig,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = DcaJobManager::with_timezone(store, config.dispatcher.timezone.clone());
    match command {
        Command::Serve => serve(manager, config).await,
        Command::List(wallet) => list_schedules(manager, wallet).await,
    }
}

/// Run the API server and dispatcher until Ctrl+C.
async fn serve<S: JobStore + 'static>(
    manager: DcaJobManager<S>,
    config: &ServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = if config.dispatcher.enabled {
        let settings = &config.dispatcher;
        let (handle, task) = Dispatcher::new(Arc::clone(manager.store()), DryRunExecutor)
            .with_tick_interval(settings.tick_interval())
            .with_lock_lifetime(settings.lock_lifetime())
            .with_batch_size(settings.batch_size)
            .with_max_concurrency(settings.max_concurrency)
            .start();
        info!(
            "Dispatcher started (tick interval: {}s, max concurrency: {})",
            settings.tick_interval_secs, settings.max_concurrency
        );
        Some((handle, task))
    } else {
        info!("Dispatcher disabled; due schedules will not be executed");
        None
    };

    let api_config = ApiConfig::new(config.server.host.clone(), config.server.port).with_cors(
        CorsSettings {
            allowed_domain: config.cors.allowed_domain.clone(),
            development: config.cors.development,
        },
    );
    if config.cors.development {
        info!("CORS allows localhost origins (development mode)");
    } else if let Some(domain) = &config.cors.allowed_domain {
        info!("Configuring CORS with allowed domain: {}", domain);
    }

    let state = api::create_api_state(manager, dispatcher.as_ref().map(|(h, _)| h.clone()));
    let server = api::start_server(api_config, state).await?;
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server.abort();
    if let Some((handle, task)) = dispatcher {
        if let Err(e) = handle.shutdown().await {
            error!("Dispatcher shutdown failed: {}", e);
        }
        let _ = task.await;
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate a configuration file without running.
fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_config(&path) {
        Ok(config) => {
            info!("Configuration is valid:");
            info!("  server: {}:{}", config.server.host, config.server.port);
            info!("  storage: {:?}", config.storage.backend());
            info!(
                "  dispatcher: {}",
                if config.dispatcher.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Print a wallet's schedules.
async fn list_schedules<S: JobStore + 'static>(
    manager: DcaJobManager<S>,
    wallet: WalletAddress,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = manager.list_jobs_by_wallet_address(&wallet).await?;

    if jobs.is_empty() {
        println!("No DCA schedules found for wallet address {}", wallet);
        return Ok(());
    }

    println!("Schedules for {}:", wallet);
    println!();

    for job in &jobs {
        println!("ID: {}", job.id);
        println!("  Interval: {}", job.data.purchase_interval_human);
        println!("  Enabled: {}", job.is_enabled());
        match job.next_run_at {
            Some(at) => println!("  Next run: {}", at.to_rfc3339()),
            None => println!("  Next run: none"),
        }
        if let Some(last) = job.last_run_at {
            println!("  Last run: {}", last.to_rfc3339());
        }
        if job.fail_count > 0 {
            println!(
                "  Failures: {} (last: {})",
                job.fail_count,
                job.fail_reason.as_deref().unwrap_or("unknown")
            );
        }
        println!("  Updated: {}", job.data.updated_at.to_rfc3339());
        println!();
    }

    Ok(())
}
