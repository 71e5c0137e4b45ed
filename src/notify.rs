use std::future::Future;

use futures::future::join_all;
use log::{info, warn};
use thiserror::Error;

use crate::email::EmailNotifier;
use crate::telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram delivery failed: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("{channel} delivery failed: {reason}")]
    Transport { channel: &'static str, reason: String },
}

/// A sink for monitor notifications.
pub(crate) trait Notifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Delivers to every target of one channel, even after a failure.
///
/// Each failure is logged; the first one is returned.
pub(crate) async fn send_each<'a, T, F, Fut>(
    channel: &str,
    targets: &'a [T],
    send: F,
) -> Result<(), NotifyError>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<(), NotifyError>>,
{
    let mut first_error = None;
    for (i, target) in targets.iter().enumerate() {
        if let Err(e) = send(target).await {
            warn!("{} delivery to recipient #{} failed: {}", channel, i + 1, e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        info!("[notification] {}\n{}", title, body);
        Ok(())
    }
}

pub enum Channel {
    Telegram(TelegramNotifier),
    Email(EmailNotifier),
    Log(LogNotifier),
}

impl Channel {
    fn name(&self) -> &'static str {
        match self {
            Channel::Telegram(_) => "telegram",
            Channel::Email(_) => "email",
            Channel::Log(_) => "log",
        }
    }
}

impl Notifier for Channel {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        match self {
            Channel::Telegram(n) => n.send(title, body).await,
            Channel::Email(n) => n.send(title, body).await,
            Channel::Log(n) => n.send(title, body).await,
        }
    }
}

/// Fans one notification out to every configured channel.
///
/// All channels are attempted; the first failure is reported once they have finished.
pub struct Notifiers {
    channels: Vec<Channel>,
}

impl Notifiers {
    pub fn new(channels: Vec<Channel>) -> Self {
        if channels.is_empty() {
            return Notifiers {
                channels: vec![Channel::Log(LogNotifier)],
            };
        }
        Notifiers { channels }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(Channel::name).collect()
    }
}

impl Notifier for Notifiers {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let results = join_all(self.channels.iter().map(|c| c.send(title, body))).await;

        let mut first_error = None;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(()) => info!("Notification \"{}\" sent via {}", title, channel.name()),
                Err(e) => {
                    warn!("Notification \"{}\" failed via {}: {}", title, channel.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
