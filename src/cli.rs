use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;

use crate::config::{AppConfig, Overrides};
use crate::providers::jira::JiraClient;
use crate::providers::todoist::TodoistClient;
use crate::sync::link::TitleLinkCodec;
use crate::sync::status_map::StatusMap;
use crate::sync::summary::RunSummary;
use crate::sync::{Engine, EngineSettings};

/// Two-way sync between a Todoist project and a Jira project.
#[derive(Parser, Debug)]
#[command(name = "tjsync", version)]
pub struct Cli {
    /// Config file (defaults to <config dir>/tjsync/config.toml)
    #[arg(long, global = true, env = "TJSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Todoist API token
    #[arg(long, global = true, env = "TODOIST_TOKEN", hide_env_values = true)]
    pub todoist_token: Option<String>,

    /// Todoist project name to sync
    #[arg(long, global = true, env = "TODOIST_PROJECT")]
    pub todoist_project: Option<String>,

    /// Jira Cloud base URL
    #[arg(long, global = true, env = "JIRA_URL")]
    pub jira_url: Option<String>,

    /// Jira account email
    #[arg(long, global = true, env = "JIRA_EMAIL")]
    pub jira_email: Option<String>,

    /// Jira API token
    #[arg(long, global = true, env = "JIRA_TOKEN", hide_env_values = true)]
    pub jira_token: Option<String>,

    /// Jira project key
    #[arg(long, global = true, env = "JIRA_PROJECT")]
    pub jira_project: Option<String>,

    /// Jira issue types to sync, e.g. Story,Task,Bug
    #[arg(long, global = true, env = "JIRA_ISSUE_TYPES", value_delimiter = ',')]
    pub jira_issue_types: Option<Vec<String>>,

    /// Polling interval for watch mode, e.g. 300, 90s, 5m, 1h
    #[arg(long, global = true, env = "SYNC_INTERVAL", value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// trace, debug, info, warn or error
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a single sync cycle
    Sync,
    /// Sync now and then on every polling interval until interrupted
    Watch {
        /// Abandon a cycle that runs longer than this
        #[arg(long, value_parser = parse_interval)]
        cycle_timeout: Option<Duration>,
    },
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            todoist_token: self.todoist_token.clone(),
            todoist_project: self.todoist_project.clone(),
            jira_url: self.jira_url.clone(),
            jira_email: self.jira_email.clone(),
            jira_token: self.jira_token.clone(),
            jira_project: self.jira_project.clone(),
            jira_issue_types: self.jira_issue_types.clone(),
            interval_secs: self.interval.map(|d| d.as_secs()),
            log_level: self.log_level.clone(),
        }
    }
}

/// Accepts plain seconds or a number with an `s`, `m` or `h` suffix.
pub fn parse_interval(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    if digits.is_empty() {
        bail!("expected a number of seconds or a duration like 5m, got {raw:?}");
    }
    let n: u64 = digits.parse()?;
    let secs = match unit {
        "s" => n,
        "m" => n.saturating_mul(60),
        "h" => n.saturating_mul(3600),
        other => bail!("unknown duration unit {other:?} in {raw:?}"),
    };
    if secs == 0 {
        bail!("duration must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

/// Wire the real Todoist and Jira clients into an engine.
pub fn build_engine(cfg: &AppConfig) -> Engine {
    let todoist = TodoistClient::new(cfg.todoist.token.clone());
    let jira = JiraClient::new(
        cfg.jira.url.clone(),
        cfg.jira.email.clone(),
        cfg.jira.token.clone(),
    );
    Engine::new(
        Arc::new(todoist),
        Arc::new(jira),
        Box::new(TitleLinkCodec::new(&cfg.jira.url)),
        StatusMap::new(cfg.status_map(), cfg.equivalent_statuses()),
        EngineSettings::from_config(cfg),
    )
}

async fn run_cycle(engine: &Engine, limit: Option<Duration>) -> Result<(RunSummary, Duration)> {
    let start = Instant::now();
    let summary = match limit {
        Some(limit) => tokio::time::timeout(limit, engine.run())
            .await
            .map_err(|_| anyhow!("sync cycle exceeded {}s", limit.as_secs()))??,
        None => engine.run().await?,
    };
    let elapsed = start.elapsed();
    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        errors = summary.has_errors(),
        "sync complete"
    );
    Ok((summary, elapsed))
}

/// `tjsync sync`: one cycle, then print the summary.
pub async fn handle_sync(engine: &Engine) -> Result<()> {
    let (summary, elapsed) = run_cycle(engine, None).await?;
    print!("{}", summary.render(elapsed));
    Ok(())
}

/// `tjsync watch`: run a cycle right away and then once per `interval`.
/// A failed cycle is logged and the loop carries on. Completion of `shutdown`
/// stops the loop, abandoning any cycle in flight.
pub async fn handle_watch(
    engine: &Engine,
    interval: Duration,
    cycle_timeout: Option<Duration>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tracing::info!(interval_secs = interval.as_secs(), "starting watch mode");

    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut shutdown => {
                tracing::warn!("shutdown requested, abandoning sync cycle in flight");
                break;
            }
            result = run_cycle(engine, cycle_timeout) => match result {
                Ok((summary, elapsed)) => print!("{}", summary.render(elapsed)),
                Err(err) => tracing::error!(error = %format!("{err:#}"), "sync cycle failed"),
            },
        }
    }

    tracing::info!("shutting down watch mode");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
