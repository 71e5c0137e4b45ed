use anyhow::{Context, Result};
use lettre::{
    message::{Mailbox, Message},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use std::time::Duration;

use crate::config::Config;
use crate::notify::{send_each, Notifier, NotifyError};

const DEFAULT_SMTP_HOST: &str = "smtp.mail.me.com";

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    /// `None` when email is not configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(recipients) = &cfg.emails else { return Ok(None); };
        if recipients.is_empty() { return Ok(None); }

        let Some(email_username) = &cfg.email_username else { return Ok(None); };
        let Some(email_app_password) = &cfg.email_app_password else { return Ok(None); };

        let host = cfg.smtp_host.as_deref().unwrap_or(DEFAULT_SMTP_HOST);

        let from = email_username
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid sender address `{}`", email_username))?;
        let recipients = recipients
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .with_context(|| format!("Invalid recipient email `{}`", r))
            })
            .collect::<Result<Vec<_>>>()?;

        // STARTTLS on 587
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Cannot set up SMTP relay {}", host))?
            .credentials(Credentials::new(
                email_username.clone(),
                email_app_password.clone(),
            ))
            .timeout(Some(Duration::from_secs(20)))
            .build();

        Ok(Some(EmailNotifier {
            mailer,
            from,
            recipients,
        }))
    }

    async fn send_to(&self, rcpt: &Mailbox, title: &str, body: &str) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(rcpt.clone())
            .subject(title)
            .body(body.to_owned())
            .map_err(transport_error)?;

        self.mailer.send(email).await.map_err(transport_error)?;
        Ok(())
    }
}

fn transport_error(e: impl std::fmt::Display) -> NotifyError {
    NotifyError::Transport {
        channel: "email",
        reason: e.to_string(),
    }
}

impl Notifier for EmailNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        send_each("email", &self.recipients, |rcpt| self.send_to(rcpt, title, body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config() -> Config {
        Config {
            emails: Some(vec!["parent@example.com".into()]),
            email_username: Some("monitor@example.com".into()),
            email_app_password: Some("app-password".into()),
            ..Config::default()
        }
    }

    #[test]
    fn unconfigured_email_is_skipped() {
        assert!(EmailNotifier::from_config(&Config::default()).unwrap().is_none());

        let cfg = Config {
            email_app_password: None,
            ..email_config()
        };
        assert!(EmailNotifier::from_config(&cfg).unwrap().is_none());
    }

    #[tokio::test]
    async fn configured_email_builds_a_transport() {
        let notifier = EmailNotifier::from_config(&email_config()).unwrap().unwrap();
        assert_eq!(notifier.recipients.len(), 1);
        assert_eq!(notifier.from.email.to_string(), "monitor@example.com");
    }

    #[test]
    fn bad_recipient_is_rejected() {
        let cfg = Config {
            emails: Some(vec!["not an address".into()]),
            ..email_config()
        };
        assert!(EmailNotifier::from_config(&cfg).is_err());
    }
}
