use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meeting_poller::config::Config;
use meeting_poller::service::{PollingService, ServiceConfig};

#[derive(Parser)]
#[command(name = "meeting-poller")]
#[command(about = "Turn meeting emails into calendar events")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "meeting-poller.toml")]
    config: PathBuf,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_poller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.print_example_config {
        print!("{}", toml::to_string_pretty(&Config::example())?);
        return Ok(());
    }

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;

    let mut config = Config::load(&cli.config)?;
    config.apply_env_overrides();
    config.validate()?;

    let mut pipeline = meeting_poller::build_pipeline(&config)
        .await
        .context("Failed to initialize")?;

    if cli.once {
        let summary = pipeline.run(config.max_messages_per_scan).await?;
        println!(
            "Checked {} messages, created {} events",
            summary.checked, summary.new_events_created
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, finishing current check...");
        shutdown_tx.send(true).ok();
        // Sender outlives the service loop
        std::future::pending::<()>().await;
    });

    let mut service = PollingService::new(pipeline, ServiceConfig::from(&config));
    let stats = service.run(shutdown_rx).await;

    tracing::info!(
        "Meeting poller stopped after {} checks ({} events created)",
        stats.checks,
        stats.events_created
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
