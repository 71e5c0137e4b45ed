use anyhow::{Context, Result};
use teloxide::{prelude::*, types::ChatId};

use crate::config::Config;
use crate::notify::{send_each, Notifier, NotifyError};

pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramNotifier {
    /// `None` when telegram is not configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(recipients) = &cfg.telegram_chat_ids else { return Ok(None); };
        if recipients.is_empty() { return Ok(None); }

        let Some(telegram_bot_token) = &cfg.telegram_bot_token else { return Ok(None); };

        let chat_ids = recipients
            .iter()
            .map(|r| {
                r.trim()
                    .parse::<i64>()
                    .map(ChatId)
                    .with_context(|| format!("Invalid telegram chat id `{}`", r))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(TelegramNotifier {
            bot: Bot::new(telegram_bot_token),
            chat_ids,
        }))
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let text = format!("{}\n\n{}", title, body);

        send_each("telegram", &self.chat_ids, |chat_id| {
            let text = text.clone();
            async move {
                self.bot
                    .send_message(*chat_id, text)
                    .await
                    .map(|_| ())
                    .map_err(NotifyError::from)
            }
        })
        .await
    }
}
