use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use feed_collector::collector::Collector;
use feed_collector::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "feed-collector",
    about = "Harvest RSS/Atom feeds and forward articles to a storage sink"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "collector.toml")]
    config: PathBuf,

    /// Run a single collection cycle, print its report as JSON, and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.validate().context("Invalid configuration")?;

    if args.check {
        println!(
            "Configuration OK: {} sources, interval {}s, sink {}",
            config.sources.len(),
            config.collection_interval_seconds,
            config.sink_url
        );
        return Ok(());
    }

    let mut collector = Collector::from_config(&config).context("Failed to create collector")?;

    if args.once {
        let report = collector.run_cycle().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize cycle report")?
        );
        return Ok(());
    }

    collector.start();
    wait_for_shutdown().await?;

    collector.stop().await;
    tracing::info!(
        cycles = collector.status().cycles_completed,
        "Collector shut down"
    );
    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C only on non-Unix platforms).
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    Ok(())
}
