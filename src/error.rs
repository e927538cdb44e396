use std::path::PathBuf;

use thiserror::Error;

/// Problems with the loaded configuration. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fetch-phase failures. These are the only errors that fail a sync cycle;
/// per-item failures are recorded in the run summary instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("find {system} container {name:?}")]
    Container {
        system: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("list {system} buckets")]
    Buckets {
        system: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("list {system} items")]
    Items {
        system: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("search {system} issues")]
    Issues {
        system: String,
        #[source]
        source: anyhow::Error,
    },
}
