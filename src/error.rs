use std::path::PathBuf;

use thiserror::Error;

/// Errors raised at the edges of the crate: config and snapshot loading.
///
/// The scheduling algorithms themselves never fail.
#[derive(Debug, Error)]
pub enum LearnloopError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not render config: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid grade '{0}': use remembered, forgot or 0-5")]
    InvalidGrade(String),

    #[error("invalid timestamp '{0}': use RFC 3339 or YYYY-MM-DD")]
    InvalidTimestamp(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, LearnloopError>;
