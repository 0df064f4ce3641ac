//! Pipeline configuration loading and validation
//!
//! `pre_load` bounds the orchestrator's work buffer, `pre_process` is the
//! readahead window inside it. Link and event sizing have defaults that suit
//! a desktop host; every field may be omitted from a TOML document.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default work buffer capacity (admitted audio entries)
pub const DEFAULT_PRE_LOAD: u32 = 8;

/// Default readahead window (entries prepared at admission)
pub const DEFAULT_PRE_PROCESS: u32 = 2;

/// Default number of chunks buffered on each stage link
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Default event bus buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the work buffer; admissions beyond it are rejected
    pub pre_load: u32,

    /// Entries admitted while fewer than this many are waiting get decoded
    /// at admission instead of when the feeder reaches them
    pub pre_process: u32,

    /// Bounded capacity (in chunks) of every stage link
    pub channel_capacity: usize,

    /// Number of events the event bus buffers for slow subscribers
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pre_load: DEFAULT_PRE_LOAD,
            pre_process: DEFAULT_PRE_PROCESS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Config with the given PreLoad/PreProcess and default link sizing
    pub fn new(pre_load: u32, pre_process: u32) -> Self {
        Self {
            pre_load,
            pre_process,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use ideka_common::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_toml_str("pre_load = 4").unwrap();
    /// assert_eq!(config.pre_load, 4);
    /// assert_eq!(config.pre_process, 2);
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded pipeline config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    ///
    /// Capacities must be non-zero and the readahead window must fit inside
    /// the work buffer.
    pub fn validate(&self) -> Result<()> {
        if self.pre_load == 0 {
            return Err(Error::Config("pre_load must be at least 1".to_string()));
        }
        if self.pre_process > self.pre_load {
            return Err(Error::Config(format!(
                "pre_process ({}) exceeds pre_load ({})",
                self.pre_process, self.pre_load
            )));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
