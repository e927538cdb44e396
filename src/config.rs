use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_TODOIST_PROJECT: &str = "Work";
pub const DEFAULT_JIRA_PROJECT: &str = "DX";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub todoist: TodoistConfig,
    pub jira: JiraConfig,
    pub sync: SyncConfig,
    pub log_level: Option<String>,
    /// Optional JSON-lines log file written alongside stderr output.
    pub log_file: Option<PathBuf>,
    /// List bucket name -> issue status name.
    pub status_map: Option<BTreeMap<String, String>>,
    /// Groups of status names treated as the same workflow state.
    pub equivalent_statuses: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TodoistConfig {
    pub token: String,
    pub project: String,
}

impl Default for TodoistConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            project: DEFAULT_TODOIST_PROJECT.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub url: String,
    pub email: String,
    pub token: String,
    pub project: String,
    pub issue_types: Vec<String>,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            email: String::new(),
            token: String::new(),
            project: DEFAULT_JIRA_PROJECT.into(),
            issue_types: ["Story", "Task", "Bug", "Sub-task"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    /// Label that opts an unlinked List item into sync.
    pub label: String,
    pub default_issue_type: String,
    /// Status a freshly created issue starts in.
    pub initial_status: String,
    /// Status an issue is moved to when its List item is completed.
    pub done_status: String,
    pub completed_lookback_hours: i64,
    pub max_results: usize,
    /// Only create List items for issues in an active sprint.
    pub require_active_sprint: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            label: "jira-sync".into(),
            default_issue_type: "Story".into(),
            initial_status: "Open".into(),
            done_status: "Done".into(),
            completed_lookback_hours: 72,
            max_results: 200,
            require_active_sprint: true,
        }
    }
}

/// Values supplied on the command line or through the environment. They take
/// precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub todoist_token: Option<String>,
    pub todoist_project: Option<String>,
    pub jira_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_token: Option<String>,
    pub jira_project: Option<String>,
    pub jira_issue_types: Option<Vec<String>>,
    pub interval_secs: Option<u64>,
    pub log_level: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tjsync")
        .join("config.toml")
}

/// Load the config file at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl AppConfig {
    pub fn apply(&mut self, o: Overrides) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        set(&mut self.todoist.token, o.todoist_token);
        set(&mut self.todoist.project, o.todoist_project);
        set(&mut self.jira.url, o.jira_url);
        set(&mut self.jira.email, o.jira_email);
        set(&mut self.jira.token, o.jira_token);
        set(&mut self.jira.project, o.jira_project);
        set(&mut self.jira.issue_types, o.jira_issue_types);
        set(&mut self.sync.interval_secs, o.interval_secs);
        if o.log_level.is_some() {
            self.log_level = o.log_level;
        }
    }

    /// Check required settings and normalise the Jira URL in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.todoist.token.is_empty() {
            return Err(ConfigError::Missing("todoist.token"));
        }
        if self.todoist.project.is_empty() {
            return Err(ConfigError::Missing("todoist.project"));
        }
        if self.jira.url.is_empty() {
            return Err(ConfigError::Missing("jira.url"));
        }
        self.jira.url = normalize_jira_url(&self.jira.url);
        if self.jira.email.is_empty() {
            return Err(ConfigError::Missing("jira.email"));
        }
        if self.jira.token.is_empty() {
            return Err(ConfigError::Missing("jira.token"));
        }
        if self.jira.project.is_empty() {
            return Err(ConfigError::Missing("jira.project"));
        }
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sync.max_results == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.max_results",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sync.completed_lookback_hours <= 0 {
            return Err(ConfigError::Invalid {
                field: "sync.completed_lookback_hours",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sync.label.trim().is_empty() {
            return Err(ConfigError::Missing("sync.label"));
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// The configured bucket -> status table, or the built-in default.
    pub fn status_map(&self) -> BTreeMap<String, String> {
        self.status_map.clone().unwrap_or_else(|| {
            ["To Do", "In Progress", "In Review", "Done", "Blocked"]
                .into_iter()
                .map(|s| (s.to_string(), s.to_string()))
                .collect()
        })
    }

    pub fn equivalent_statuses(&self) -> Vec<Vec<String>> {
        self.equivalent_statuses
            .clone()
            .unwrap_or_else(|| vec![vec!["To Do".into(), "Open".into()]])
    }

    /// JQL fragment restricting the search to the configured issue types,
    /// e.g. `issuetype IN (Story, "Sub task")`.
    pub fn issue_types_jql(&self) -> Option<String> {
        let types: Vec<String> = self
            .jira
            .issue_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.contains(' ') || t.contains(',') {
                    format!("\"{}\"", t.replace('"', "\\\""))
                } else {
                    t.to_string()
                }
            })
            .collect();
        if types.is_empty() {
            None
        } else {
            Some(format!("issuetype IN ({})", types.join(", ")))
        }
    }

    /// Query selecting the issues this tool keeps in sync.
    pub fn issue_query(&self) -> String {
        let mut jql = format!("project = {} AND assignee = currentUser()", self.jira.project);
        if let Some(types) = self.issue_types_jql() {
            jql.push_str(" AND ");
            jql.push_str(&types);
        }
        jql.push_str(" ORDER BY updated DESC");
        jql
    }
}

/// Ensure the URL has a scheme and no trailing slash.
pub fn normalize_jira_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
