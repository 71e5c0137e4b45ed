use std::{
    env,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_yaml::Deserializer;
use url::Url;

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_TARGET_URL: &str = "http://www.lixia.gov.cn/col/col37116/index.html";
const DEFAULT_PUSH_TIMES: [&str; 2] = ["09:00", "21:00"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target_url: String,
    /// Prefix for relative links in the listing. Defaults to the origin of `target_url`.
    pub site_origin: Option<String>,
    /// Seconds between two update checks.
    pub scan_interval: u64,
    pub send_startup_notify: bool,
    pub daily_push_enabled: bool,
    pub daily_push_times: Vec<String>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    /// Days of daily log files to keep.
    pub log_retention: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Option<Vec<String>>,
    pub emails: Option<Vec<String>>,
    pub email_username: Option<String>,
    pub email_app_password: Option<String>,
    pub smtp_host: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target_url: DEFAULT_TARGET_URL.to_string(),
            site_origin: None,
            scan_interval: 300,
            send_startup_notify: true,
            daily_push_enabled: true,
            daily_push_times: DEFAULT_PUSH_TIMES.iter().map(|t| t.to_string()).collect(),
            log_level: "INFO".to_string(),
            log_dir: None,
            log_retention: 30,
            telegram_bot_token: None,
            telegram_chat_ids: None,
            emails: None,
            email_username: None,
            email_app_password: None,
            smtp_host: None,
        }
    }
}

pub struct EnsureOutcome {
    pub path: PathBuf,
    pub created: bool,
}

impl Config {
    pub fn ensure_user_config() -> Result<EnsureOutcome> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME);

        if let Some(path) = xdg_dirs.find_config_file("config.yaml") {
            return Ok(EnsureOutcome {
                path,
                created: false,
            });
        }

        let config_path = xdg_dirs
            .place_config_file("config.yaml")
            .context("cannot create configuration directory")?;
        let mut config_file = File::create(&config_path)?;

        write!(
            &mut config_file,
            r#"# {APP_NAME} config (YAML)
# Every key is optional. Environment variables (TARGET_URL, SCAN_INTERVAL, ...)
# take precedence over the values below.

target_url: "{DEFAULT_TARGET_URL}"
scan_interval: 300
send_startup_notify: true
daily_push_enabled: true
daily_push_times:
  - "09:00"
  - "21:00"
log_level: "INFO"
log_retention: 30

# Optional telegram delivery (skipped with --no-telegram)
# telegram_bot_token: "<your bot token>"
# telegram_chat_ids:
#   - "chat1_id"

# Optional email delivery (skipped with --no-email)
# smtp_host: "smtp.mail.me.com"
# email_username: "your email"
# email_app_password: "your password"
# emails:
#   - "you@example.com"
"#
        )?;

        Ok(EnsureOutcome {
            path: config_path,
            created: true,
        })
    }

    /// Reads the YAML file, applies environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&raw).map_err(|e| anyhow!("Invalid YAML in {}: {}", path.display(), e))
    }

    fn from_yaml(raw: &str) -> Result<Config> {
        // serde_yaml rejects an empty document, even for an all-default struct
        let has_content = raw.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        });
        if !has_content {
            return Ok(Config::default());
        }

        let deserialized = Deserializer::from_str(raw);
        serde_path_to_error::deserialize(deserialized)
            .map_err(|e| anyhow!("at `{}`: {}", e.path(), e.inner()))
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // `# comment` stripping only applies to numbers and flags; secrets and URLs may contain `#`
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| lookup(key).map(|v| strip_comment(&v)).filter(|v| !v.is_empty());

        if let Some(v) = get("TARGET_URL") {
            self.target_url = v;
        }
        if let Some(v) = get("SITE_ORIGIN") {
            self.site_origin = Some(v);
        }
        if let Some(v) = number("SCAN_INTERVAL") {
            self.scan_interval = v
                .parse()
                .with_context(|| format!("SCAN_INTERVAL must be a whole number of seconds, got `{v}`"))?;
        }
        if let Some(v) = number("SEND_STARTUP_NOTIFY") {
            self.send_startup_notify = parse_bool(&v);
        }
        if let Some(v) = number("DAILY_PUSH_ENABLED") {
            self.daily_push_enabled = parse_bool(&v);
        }
        if let Some(v) = lookup("DAILY_PUSH_TIMES") {
            self.daily_push_times = split_list(&v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = number("LOG_RETENTION") {
            self.log_retention = v
                .parse()
                .with_context(|| format!("LOG_RETENTION must be a whole number of days, got `{v}`"))?;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_IDS") {
            self.telegram_chat_ids = Some(split_list(&v));
        }
        if let Some(v) = get("NOTIFY_EMAILS") {
            self.emails = Some(split_list(&v));
        }
        if let Some(v) = get("EMAIL_USERNAME") {
            self.email_username = Some(v);
        }
        if let Some(v) = get("EMAIL_APP_PASSWORD") {
            self.email_app_password = Some(v);
        }
        if let Some(v) = get("SMTP_HOST") {
            self.smtp_host = Some(v);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scan_interval == 0 {
            bail!("scan_interval must be a positive number of seconds");
        }
        if self.log_retention == 0 {
            bail!("log_retention must be at least one day");
        }
        self.target()?;
        self.origin()?;
        self.push_times()?;
        Ok(())
    }

    pub fn target(&self) -> Result<Url> {
        Url::parse(&self.target_url).with_context(|| format!("Invalid target_url `{}`", self.target_url))
    }

    pub fn origin(&self) -> Result<Url> {
        match &self.site_origin {
            Some(origin) => {
                Url::parse(origin).with_context(|| format!("Invalid site_origin `{origin}`"))
            }
            None => {
                let origin = self.target()?.origin().ascii_serialization();
                Url::parse(&origin).with_context(|| format!("target_url has no usable origin ({origin})"))
            }
        }
    }

    /// Configured daily push times, sorted and deduplicated. Falls back to 09:00 and 21:00.
    pub fn push_times(&self) -> Result<Vec<NaiveTime>> {
        let raw: Vec<&str> = if self.daily_push_times.iter().all(|t| t.trim().is_empty()) {
            DEFAULT_PUSH_TIMES.to_vec()
        } else {
            self.daily_push_times
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect()
        };

        let mut times = raw
            .into_iter()
            .map(|t| {
                NaiveTime::parse_from_str(t, "%H:%M")
                    .with_context(|| format!("Invalid daily push time `{t}`, expected HH:MM"))
            })
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }
}

fn strip_comment(value: &str) -> String {
    value.split('#').next().unwrap_or_default().trim().to_string()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
