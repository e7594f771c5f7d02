//! MeroPools pool operator
//!
//! Runs the operator cycle (write-back retries, refresh, matching,
//! settlement) as a daemon, or one step at a time for maintenance.

mod app;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meropools_config::{validate_config, AppConfig, ConfigLoader};
use meropools_metrics::{init_tracing, LogFormat, MetricsCollector, MetricsServer};
use meropools_orchestrator::{LoadOutcome, MatchingError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::App;

/// MeroPools pool operator CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, default_value = "config/local.toml")]
    config: PathBuf,

    /// Prefix of environment overrides
    #[arg(long, global = true, default_value = "MEROPOOLS")]
    env_prefix: String,

    /// Log output: pretty or json (overrides the config file)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run operator cycles until interrupted
    Run,
    /// Print the pool's active users and orders
    Refresh,
    /// Trigger one batch
    Match,
    /// Settle a loaded batch
    Settle {
        batch_id: String,
    },
    /// Retry write-backs of chain-settled batches
    RetryWritebacks,
    /// List the pending settlement store
    Pending,
    /// Provision the default private context and print it
    EnsureContext,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let format = match cli.log_format {
        Some(format) => format,
        None => config
            .network
            .log_format
            .parse()
            .context("invalid network.log_format")?,
    };

    let metrics = Arc::new(MetricsCollector::new());
    init_tracing(&config.network.log_level, format, metrics.clone())
        .context("failed to initialise tracing")?;

    info!(
        environment = ?config.network.environment,
        config = %cli.config.display(),
        "Starting MeroPools operator"
    );

    let app = App::build(config, metrics).await?;

    match cli.command {
        Command::Run => run(app).await,
        Command::Refresh => refresh(&app).await,
        Command::Match => trigger_match(&app).await,
        Command::Settle { batch_id } => settle(&app, &batch_id).await,
        Command::RetryWritebacks => retry_write_backs(&app).await,
        Command::Pending => pending(&app).await,
        Command::EnsureContext => ensure_context(&app).await,
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = ConfigLoader::from_file_with_env(&cli.config, &cli.env_prefix)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    validate_config(&config)?;
    Ok(config)
}

async fn run(app: App) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    let metrics_server = if app.config.network.metrics_enabled {
        let server = MetricsServer::new(
            app.metrics.clone(),
            format!("0.0.0.0:{}", app.config.network.metrics_port),
        );
        let shutdown = wait_for(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve_with_shutdown(shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    let interval = app
        .config
        .pool
        .cycle_interval(app.pool.config.batch_frequency_seconds);
    info!(interval_secs = interval.as_secs(), "Operator loop starting");
    app.operator.run(interval, wait_for(shutdown_rx)).await;

    if let Some(handle) = metrics_server {
        if let Err(e) = handle.await {
            warn!(error = %e, "Metrics server task ended abnormally");
        }
    }
    info!("Operator stopped");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn refresh(app: &App) -> Result<()> {
    let reconciler = app.operator.reconciler();
    let summary = reconciler.refresh().await?;
    let working = reconciler.working_set().await;

    println!("active users:  {}", summary.active_users);
    for user in &working.active_users {
        println!("  {user}");
    }
    println!("active orders: {}", summary.active_orders);
    for order in &working.active_orders {
        println!(
            "  {} {} {} -> {}",
            order.id, order.amount_deposited, order.token_deposited, order.expected_exchange_token
        );
    }
    Ok(())
}

async fn trigger_match(app: &App) -> Result<()> {
    let reconciler = app.operator.reconciler();
    reconciler.refresh().await?;

    match reconciler.trigger_matching().await {
        Ok(LoadOutcome::Loaded(loaded)) => {
            println!(
                "{}: {} pairs at clearing price {}",
                loaded.batch.batch_id,
                loaded.batch.pair_count(),
                loaded.batch.clearing_price
            );
            Ok(())
        }
        Ok(LoadOutcome::AlreadyLoaded) => {
            println!("batch already loaded");
            Ok(())
        }
        Err(MatchingError::InsufficientOrders { found }) => {
            println!("not enough active orders to match ({found})");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn settle(app: &App, batch_id: &str) -> Result<()> {
    let reconciler = app.operator.reconciler();
    reconciler.load_batch(batch_id).await?;

    let loaded = reconciler
        .working_set()
        .await
        .batch(batch_id)
        .cloned()
        .with_context(|| format!("batch {batch_id} is not loaded"))?;

    let receipt = app
        .operator
        .submitter()
        .settle(&loaded.batch, &loaded.orders)
        .await?;
    reconciler.mark_settled(batch_id, &receipt.tx_hash).await?;

    println!(
        "{}: settled in {}{}",
        receipt.batch_id,
        receipt.tx_hash,
        if receipt.resumed { " (resumed)" } else { "" }
    );
    Ok(())
}

async fn retry_write_backs(app: &App) -> Result<()> {
    let report = app.operator.submitter().retry_write_backs().await?;

    for receipt in &report.written_back {
        println!("written back: {} {}", receipt.batch_id, receipt.tx_hash);
    }
    for (batch_id, error) in &report.failed {
        println!("failed:       {batch_id} {error}");
    }
    for batch_id in &report.needs_review {
        println!("needs review: {batch_id}");
    }
    Ok(())
}

async fn pending(app: &App) -> Result<()> {
    let pending = app.operator.submitter().pending().await?;
    println!("{}", serde_json::to_string_pretty(&pending)?);
    Ok(())
}

async fn ensure_context(app: &App) -> Result<()> {
    let ensured = app.contexts.ensure_default_context().await?;
    println!("{}", serde_json::to_string_pretty(&ensured.record)?);
    if ensured.was_created {
        println!("(created)");
    }
    Ok(())
}
