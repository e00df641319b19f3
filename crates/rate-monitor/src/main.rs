use anyhow::{Context, Result};
use notification_service::NotificationService;
use rate_scraper::RateScraper;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;

use rate_monitor::{HistoryStore, MonitorConfig, PollLoop, PollSettings, Tracker};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting mortgage rate monitor");

    // 2. Configuration is validated before anything touches the network
    let config = MonitorConfig::load().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Source: {}", config.source.url);
    tracing::info!("  Term: {}", config.source.term);
    tracing::info!("  Threshold: {}%", config.threshold);
    tracing::info!("  Poll interval: {}s", config.poll.interval_secs);
    tracing::info!("  State file: {}", config.state_file.display());
    tracing::info!("  Recipients: {}", config.email.recipients.len());

    // 3. Rate history; a corrupt state file is fatal
    let tracker = Tracker::load(HistoryStore::new(&config.state_file))
        .context("Failed to load rate history")?;
    tracing::info!("Rate history:\n{}", tracker.summary());

    // 4. Collaborators
    let scraper = RateScraper::new(
        config.source.url.clone(),
        config.source.term.clone(),
        config.fetch_timeout(),
    )?;
    let notifier = NotificationService::new(&config.notification_config())
        .context("Failed to initialize email notifications")?;

    let settings = PollSettings {
        threshold: config.threshold,
        interval: config.poll_interval(),
        subject: config.email.subject.clone(),
    };
    let mut poll = PollLoop::new(scraper, notifier, tracker, settings);

    if config.poll.run_once {
        let outcome = poll.run_cycle().await.context("Rate check failed")?;
        tracing::info!("Single run finished: {:?}", outcome);
        tracing::info!("Rate history:\n{}", poll.tracker().summary());
        return Ok(());
    }

    // 5. Main loop with graceful shutdown (SIGINT + SIGTERM)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));

    tracing::info!("Monitor is now running. Press Ctrl+C to stop.");
    let tracker = poll.run(shutdown_rx).await;

    tracing::info!("Final rate history:\n{}", tracker.summary());
    tracing::info!("Mortgage rate monitor shut down.");
    Ok(())
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    match tokio::signal::unix::signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
            }
        }
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable ({}), listening for Ctrl+C only", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            tracing::info!("Received SIGINT");
        }
    }

    tracing::info!("Shutdown requested, finishing the current cycle...");
    tx.send(true).ok();
}
