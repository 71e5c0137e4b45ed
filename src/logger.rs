use anyhow::Result;
use anyhow::anyhow;
use ftail::Ftail;
use log::LevelFilter;
use log::info;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;

const LOGS_DIR: &str = ".logs";
const PKG_NAME: &str = env!("CARGO_PKG_NAME");

pub fn init_logger(cfg: &Config) -> Result<()> {
    let level = level_filter(&cfg.log_level)?;
    let logs_path = logs_dir(cfg)?;

    // Idempotent, safe on every start
    match fs::create_dir_all(&logs_path) {
        Ok(_) => (),
        Err(e) => {
            return Err(anyhow!(
                "Could not create logs dir at {:#?}: {}",
                &logs_path,
                e
            ));
        }
    }

    match Ftail::new()
        .console(level)
        // one file per day, older ones are pruned
        .daily_file(&logs_path, level)
        .retention_days(cfg.log_retention)
        .init()
    {
        Ok(_) => {
            info!(
                "Logger initialized at {} ({}, keeping {} days)",
                logs_path.display(),
                level,
                cfg.log_retention
            );
            Ok(())
        }
        Err(e) => Err(anyhow!("Could not initialize logger: {}", e)),
    }
}

fn logs_dir(cfg: &Config) -> Result<PathBuf> {
    if let Some(dir) = &cfg.log_dir {
        return Ok(dir.clone());
    }

    match env::home_dir() {
        Some(h) => Ok(h.join(LOGS_DIR).join(PKG_NAME)),
        None => Err(anyhow!("Could not determine $HOME, set LOG_DIR instead")),
    }
}

/// Accepts the usual level names, including `WARNING`.
fn level_filter(name: &str) -> Result<LevelFilter> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("warning") {
        return Ok(LevelFilter::Warn);
    }
    name.parse::<LevelFilter>()
        .map_err(|_| anyhow!("Unknown log level `{}`", name))
}
