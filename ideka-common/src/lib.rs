//! # Ideka Common Library
//!
//! Shared code for the Ideka audio pipeline crates:
//! - Pipeline configuration (PreLoad / PreProcess and link sizing)
//! - Event types (PipelineEvent enum) and the EventBus
//! - Common error type
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent, PipelineState};
