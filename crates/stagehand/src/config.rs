//! # Configuration
//!
//! Runtime knobs for driving behaviors, read from TOML. Every field has a
//! default so an empty document is a valid configuration.

use crate::errors::BehaviorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default capacity of a driven behavior's mailbox
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagehandConfig {
    pub mailbox_capacity: usize,
    /// Default for relaying nested machine states to the parent
    pub sync_machines: bool,
    pub logging: LoggingConfig,
}

impl Default for StagehandConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            sync_machines: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl StagehandConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, BehaviorError> {
        let config: StagehandConfig =
            toml::from_str(content).map_err(|e| BehaviorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BehaviorError> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), BehaviorError> {
        if self.mailbox_capacity == 0 {
            return Err(BehaviorError::Config(
                "mailbox_capacity must be greater than zero".to_string(),
            ));
        }
        self.logging.tracing_level()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output: LogOutput,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            file_path: None,
        }
    }
}

impl LoggingConfig {
    pub fn tracing_level(&self) -> Result<tracing::Level, BehaviorError> {
        self.level
            .parse::<tracing::Level>()
            .map_err(|_| BehaviorError::Config(format!("unknown log level '{}'", self.level)))
    }

    /// Installs the global subscriber described by this configuration.
    pub fn init(&self) -> anyhow::Result<()> {
        let level = self.tracing_level()?;
        match self.output {
            LogOutput::Stdout => crate::logging::init_stdout(&level),
            LogOutput::File => {
                let path = self
                    .file_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("stagehand.log"));
                crate::logging::init_file(path, &level)
            }
        }
    }
}
