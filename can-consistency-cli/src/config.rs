//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_consistency::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Property table JSON files, loaded in order
    #[serde(default)]
    pub property_files: Vec<PathBuf>,
}

/// One upper-layer/bus log pair to analyze
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub id: String,
    pub upper_log: PathBuf,
    pub bus_log: PathBuf,
    /// Explicit property or signal names
    #[serde(default)]
    pub names: Vec<String>,
    /// Bug-comment text file to extract property names from
    pub comments: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Report file (default: stdout)
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub pretty: bool,
    /// Worker threads for the batch (default: rayon's global pool)
    pub threads: Option<usize>,
}

/// Semantic problems found after parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("session id '{0}' is declared more than once")]
    DuplicateSession(String),

    #[error("session with empty id")]
    EmptySessionId,

    #[error("output.threads must be at least 1")]
    InvalidThreads,

    #[error(transparent)]
    Engine(#[from] can_consistency::EngineError),
}

impl AppConfig {
    /// Check the configuration for errors that TOML parsing cannot catch
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.engine.validate()?;

        if self.output.threads == Some(0) {
            return Err(ConfigError::InvalidThreads);
        }

        let mut seen = HashSet::new();
        for session in &self.sessions {
            if session.id.trim().is_empty() {
                return Err(ConfigError::EmptySessionId);
            }
            if !seen.insert(session.id.as_str()) {
                return Err(ConfigError::DuplicateSession(session.id.clone()));
            }
        }
        Ok(())
    }

    /// Make relative paths relative to `base` (the config file's directory)
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.input.property_files.iter_mut().for_each(resolve);
        for session in &mut self.sessions {
            resolve(&mut session.upper_log);
            resolve(&mut session.bus_log);
            if let Some(comments) = session.comments.as_mut() {
                resolve(comments);
            }
        }
        if let Some(output) = self.output.path.as_mut() {
            resolve(output);
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    log::debug!(
        "Config: {} session(s), {} property file(s)",
        config.sessions.len(),
        config.input.property_files.len()
    );
    Ok(config)
}
