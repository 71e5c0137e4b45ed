use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::config::{Config, EnsureOutcome};
use crate::email::EmailNotifier;
use crate::fetcher::Fetcher;
use crate::logger::init_logger;
use crate::monitor::Monitor;
use crate::notify::{Channel, Notifiers};
use crate::telegram::TelegramNotifier;

pub async fn run_monitor(env_file: Option<&Path>, no_email: bool, no_telegram: bool) -> Result<()> {
    // 0) Environment, .env first so it can feed the config
    match env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    // 1) Config
    let config_outcome: EnsureOutcome = Config::ensure_user_config()?;
    let cfg = Config::load(&config_outcome.path)?;

    // 2) Logger
    init_logger(&cfg)?;
    if config_outcome.created {
        info!(
            "Config file created at {}. Running with defaults and environment overrides.",
            config_outcome.path.display()
        );
    } else {
        debug!("Config loaded from {}", config_outcome.path.display());
    }

    // 3) Notification channels
    let notifiers = Notifiers::new(build_channels(&cfg, no_email, no_telegram)?);
    info!("Notifications go to: {}", notifiers.channel_names().join(", "));

    // 4) Fetcher + monitor
    let fetcher = Fetcher::new(cfg.target()?).context("Failed to build HTTP client")?;
    info!("Watching {}", fetcher.url());
    let mut monitor = Monitor::new(&cfg, fetcher, notifiers)?;

    // 5) Run until a termination signal arrives
    let reason = tokio::select! {
        _ = monitor.run() => "monitor loop ended",
        signal = shutdown_signal() => signal?,
    };

    info!("Received {}, shutting down", reason);
    monitor.shutdown(reason).await;

    Ok(())
}

fn build_channels(cfg: &Config, no_email: bool, no_telegram: bool) -> Result<Vec<Channel>> {
    let mut channels = Vec::new();

    if no_telegram {
        info!("--no-telegram flag set, skipping telegram notifications");
    } else {
        match TelegramNotifier::from_config(cfg)? {
            Some(telegram) => channels.push(Channel::Telegram(telegram)),
            None => debug!("Telegram is not configured"),
        }
    }

    if no_email {
        info!("--no-email flag set, skipping email notifications");
    } else {
        match EmailNotifier::from_config(cfg)? {
            Some(email) => channels.push(Channel::Email(email)),
            None => debug!("Email is not configured"),
        }
    }

    if channels.is_empty() {
        warn!("No notification channel available, notifications will only be logged");
    }

    Ok(channels)
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
