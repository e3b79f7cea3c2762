//! Core utilities shared across the engine.
//!
//! This crate provides the foundation the other crates build on:
//! - Error types and result aliases
//! - Logging initialization
//! - Engine configuration loaded from an optional TOML file

mod config;
mod error;
mod logging;

pub use config::{EngineConfig, SlotPolicyConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
