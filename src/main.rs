mod app;
mod config;
mod detector;
mod email;
mod extractor;
mod fetcher;
mod logger;
mod models;
mod monitor;
mod notify;
mod schedule;
mod telegram;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
#[command(name = "lixia-monitor")]
#[command(about = "Watches the Lixia district education news listing and pushes updates")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Skip email notifications
    #[arg(long)]
    no_email: bool,

    /// Skip telegram notifications
    #[arg(long)]
    no_telegram: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    app::run_monitor(cli.env_file.as_deref(), cli.no_email, cli.no_telegram).await
}
