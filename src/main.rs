mod cli;
mod config;
mod error;
mod logging;
mod model;
mod providers;
mod sync;
mod util;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_config(&path)?;
    cfg.apply(cli.overrides());
    cfg.validate()?;

    logging::init(cfg.log_level(), cfg.log_file.as_deref())?;
    tracing::info!(
        config_path = %path.display(),
        todoist_project = %cfg.todoist.project,
        jira_url = %cfg.jira.url,
        jira_email = %cfg.jira.email,
        jira_project = %cfg.jira.project,
        jira_issue_types = ?cfg.jira.issue_types,
        interval_secs = cfg.sync.interval_secs,
        "config"
    );

    let engine = cli::build_engine(&cfg);

    match cli.command {
        Command::Sync => cli::handle_sync(&engine).await,
        Command::Watch { cycle_timeout } => {
            cli::handle_watch(
                &engine,
                Duration::from_secs(cfg.sync.interval_secs),
                cycle_timeout,
                cli::shutdown_signal(),
            )
            .await
        }
    }
}
