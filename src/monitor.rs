use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::extractor::NewsExtractor;
use crate::fetcher::{FetchError, PageSource};
use crate::models::NewsRecord;
use crate::notify::{Notifier, NotifyError};
use crate::schedule::DailySchedule;
use crate::utils::{
    format_daily_message, format_startup_message, format_update_message, DAILY_TITLE,
    ERROR_TITLE, SHUTDOWN_TITLE, STARTUP_TITLE, UPDATE_TITLE,
};

/// Pause after a failed check, instead of the regular scan interval.
pub const RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

pub struct MonitorState {
    pub started_at: DateTime<Local>,
    pub checks: u64,
    detector: ChangeDetector,
}

impl MonitorState {
    fn new() -> Self {
        MonitorState {
            started_at: Local::now(),
            checks: 0,
            detector: ChangeDetector::new(),
        }
    }

    fn uptime(&self) -> String {
        let elapsed = Local::now() - self.started_at;
        format!(
            "{}d {}h {}m",
            elapsed.num_days(),
            elapsed.num_hours() % 24,
            elapsed.num_minutes() % 60
        )
    }
}

/// Drives the watch loop: daily pushes, change checks and error recovery.
///
/// Everything runs on one task, one cycle at a time. The snapshot lives in
/// `state` and is only touched through `&mut self`.
pub(crate) struct Monitor<S, N> {
    source: S,
    notifier: N,
    extractor: NewsExtractor,
    schedule: DailySchedule,
    state: MonitorState,
    scan_interval: Duration,
    send_startup_notify: bool,
    push_times: Vec<NaiveTime>,
}

impl<S: PageSource, N: Notifier> Monitor<S, N> {
    pub fn new(cfg: &Config, source: S, notifier: N) -> Result<Self> {
        let push_times = if cfg.daily_push_enabled {
            cfg.push_times()?
        } else {
            Vec::new()
        };

        Ok(Monitor {
            source,
            notifier,
            extractor: NewsExtractor::new(cfg.origin()?),
            schedule: DailySchedule::default(),
            state: MonitorState::new(),
            scan_interval: Duration::from_secs(cfg.scan_interval),
            send_startup_notify: cfg.send_startup_notify,
            push_times,
        })
    }

    /// Runs until the future is dropped.
    pub async fn run(&mut self) {
        self.startup(Local::now().naive_local()).await;

        loop {
            let pause = self.tick(Local::now().naive_local()).await;
            debug!("Next check in {:?}", pause);
            tokio::time::sleep(pause).await;
        }
    }

    pub async fn startup(&mut self, now: NaiveDateTime) {
        info!("Watching for updates every {:?}", self.scan_interval);

        if self.send_startup_notify {
            match self.latest_news().await {
                Ok(Some(latest)) => {
                    let message = format_startup_message(&latest);
                    if let Err(e) = self.notifier.send(STARTUP_TITLE, &message).await {
                        warn!("Startup notification failed: {}", e);
                    }
                }
                Ok(None) => warn!("No news on the page at startup, nothing to announce"),
                Err(e) => warn!("Could not load the latest news at startup: {}", e),
            }
        }

        if !self.push_times.is_empty() {
            self.schedule = DailySchedule::new(&self.push_times, now);
            let times: Vec<String> = self
                .push_times
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect();
            info!("Daily push enabled at {}", times.join(", "));
            if let Some(next) = self.schedule.next_due(now) {
                info!("Next daily push at {}", next);
            }
        }
    }

    /// One loop iteration. Returns how long to sleep before the next one.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Duration {
        self.run_daily_pushes(now).await;

        match self.check_cycle().await {
            Ok(()) => self.scan_interval,
            Err(e) => {
                self.recover(e).await;
                RECOVERY_INTERVAL
            }
        }
    }

    pub async fn shutdown(&self, reason: &str) {
        info!(
            "Shutting down ({}) after {} checks, up {}",
            reason,
            self.state.checks,
            self.state.uptime()
        );

        let message = format!(
            "Monitor stopped ({}) after {} checks.",
            reason, self.state.checks
        );
        if let Err(e) = self.notifier.send(SHUTDOWN_TITLE, &message).await {
            warn!("Shutdown notification failed: {}", e);
        }
    }

    async fn run_daily_pushes(&mut self, now: NaiveDateTime) {
        if self.schedule.is_empty() {
            return;
        }

        for time in self.schedule.take_due(now) {
            let label = time.format("%H:%M");
            match self.daily_push().await {
                Ok(true) => info!("Daily push for {} sent", label),
                Ok(false) => warn!("Daily push for {} skipped, no news on the page", label),
                Err(e) => error!("Daily push for {} failed: {}", label, e),
            }
        }
    }

    async fn daily_push(&self) -> Result<bool, MonitorError> {
        let Some(latest) = self.latest_news().await? else {
            return Ok(false);
        };

        self.notifier
            .send(DAILY_TITLE, &format_daily_message(&latest))
            .await?;
        Ok(true)
    }

    async fn latest_news(&self) -> Result<Option<NewsRecord>, FetchError> {
        let body = self.source.fetch().await?;
        Ok(self.extractor.parse(&body).into_iter().next())
    }

    async fn check_cycle(&mut self) -> Result<(), MonitorError> {
        self.state.checks += 1;
        debug!("Check #{}, up {}", self.state.checks, self.state.uptime());

        let body = self.source.fetch().await?;
        let had_baseline = self.state.detector.snapshot().is_some();

        if !self.state.detector.check_update(body) {
            if had_baseline {
                debug!("No change since the last check");
            } else {
                info!("Baseline snapshot established");
            }
            return Ok(());
        }

        info!("Page content changed");
        let news = self
            .extractor
            .parse(self.state.detector.snapshot().unwrap_or_default());
        if news.is_empty() {
            warn!("Page changed but no news entries could be extracted");
            return Ok(());
        }

        self.notifier
            .send(UPDATE_TITLE, &format_update_message(&news))
            .await?;
        Ok(())
    }

    async fn recover(&self, err: MonitorError) {
        error!("Check #{} failed: {}", self.state.checks, err);

        // a channel that rejected the update may still take the shorter error notice
        let message = format!(
            "Error while monitoring: {}\nRetrying in {}s.",
            err,
            RECOVERY_INTERVAL.as_secs()
        );
        if let Err(e) = self.notifier.send(ERROR_TITLE, &message).await {
            warn!("Error notification failed as well: {}", e);
        }
    }
}
