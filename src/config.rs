use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::{DEFAULT_MAX_HISTORY_TURNS, DEFAULT_MAX_TOTAL_CHARS};
use crate::conversation::{DEFAULT_MAX_CHARS, DEFAULT_TRANSLATE_PROMPT};
use crate::error::{LearnloopError, Result};
use crate::profile::{GenerationGate, ProfileLimits};
use crate::queue::DEFAULT_MAX_QUEUE;

pub const CONFIG_ENV: &str = "LEARNLOOP_CONFIG";
const CONFIG_DIR_NAME: &str = "learnloop";
const CONFIG_FILE_NAME: &str = "config.toml";
/// Upper bound for every profile day window.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Tunables for every pass. Missing sections and keys fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub context: ContextConfig,
    pub reading: ReadingConfig,
    pub profile: ProfileLimits,
    pub generation: GenerationGate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queue: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue: DEFAULT_MAX_QUEUE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_history_turns: usize,
    pub max_total_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            max_total_chars: DEFAULT_MAX_TOTAL_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub max_chars: usize,
    pub translate_prompt: String,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            translate_prompt: DEFAULT_TRANSLATE_PROMPT.to_string(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    UserDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Flag(p) | ConfigSource::Env(p) | ConfigSource::UserDir(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Picks the config file: explicit flag, then `LEARNLOOP_CONFIG`, then the
/// user config dir when a file exists there.
pub fn resolve_config_source(flag: Option<&Path>) -> ConfigSource {
    if let Some(path) = flag {
        return ConfigSource::Flag(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return ConfigSource::Env(PathBuf::from(path));
        }
    }

    match default_config_path() {
        Some(path) if path.is_file() => ConfigSource::UserDir(path),
        _ => ConfigSource::Defaults,
    }
}

impl Config {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(raw).map_err(|source| LearnloopError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw, path)
    }

    pub fn load(source: &ConfigSource) -> Result<Self> {
        let config = match source.path() {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        tracing::debug!(source = ?source, "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.max_queue == 0 {
            return Err(LearnloopError::InvalidConfig(
                "queue.max_queue must be at least 1".to_string(),
            ));
        }

        let thresholds = [
            ("profile.weak_threshold", self.profile.weak_threshold),
            ("generation.min_coverage", self.generation.min_coverage),
            ("generation.max_similarity", self.generation.max_similarity),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(LearnloopError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        for (name, value) in &thresholds[1..] {
            if *value > 1.0 {
                return Err(LearnloopError::InvalidConfig(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        let windows = [
            ("profile.recent_days", self.profile.recent_days),
            ("profile.lookback_days", self.profile.lookback_days),
            ("profile.wrong_window_days", self.profile.wrong_window_days),
        ];
        for (name, days) in windows {
            if !(0..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(LearnloopError::InvalidConfig(format!(
                    "{} must be between 0 and {} days, got {}",
                    name, MAX_WINDOW_DAYS, days
                )));
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
