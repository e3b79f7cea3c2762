//! Engine configuration.
//!
//! Configuration is loaded from an optional TOML file; every field has a
//! default so a missing file or a partial file is fine. The renderer-facing
//! knobs here (frame overlap, slot policy, arena budgets) are plain data;
//! the renderer crate converts them into its own types at startup.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Frame-slot selection policy, as configured.
///
/// `Blocking` waits on the slot fence with a timeout and is the recommended
/// default. `Polling` scans slots for an already-signaled fence and skips
/// the frame entirely when none is ready within `max_scans` attempts.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SlotPolicyConfig {
    Blocking,
    Polling { max_scans: u32 },
}

impl Default for SlotPolicyConfig {
    fn default() -> Self {
        SlotPolicyConfig::Blocking
    }
}

/// Engine configuration, deserialized from `kiln.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Initial window width in pixels.
    pub width: u32,
    /// Initial window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Request FIFO (vsync) presentation instead of a non-blocking mode.
    pub vsync: bool,
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    /// Number of frames in flight (clamped to 1..=4 by the renderer).
    pub frame_overlap: usize,
    /// Frame-slot selection policy.
    pub slot_policy: SlotPolicyConfig,
    /// Byte budget for the shared vertex arena.
    pub vertex_arena_bytes: u64,
    /// Byte budget for the shared index arena.
    pub index_arena_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Kiln".to_string(),
            vsync: true,
            validation: cfg!(debug_assertions),
            frame_overlap: 2,
            slot_policy: SlotPolicyConfig::default(),
            vertex_arena_bytes: 64 * 1024 * 1024,
            index_arena_bytes: 16 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// a [`Error::Config`] error so typos are not silently ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&text).map_err(|e| Error::Config(format!("{:?}: {}", path, e)))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.width > 0 && config.height > 0);
        assert!(config.frame_overlap >= 1);
        assert!(config.vertex_arena_bytes > config.index_arena_bytes);
        assert_eq!(config.slot_policy, SlotPolicyConfig::Blocking);
    }

    #[test]
    fn test_parse_partial_file() {
        let config: EngineConfig = toml::from_str(
            r#"
            width = 800
            height = 600
            vsync = false
            "#,
        )
        .unwrap();

        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert!(!config.vsync);
        // Unspecified fields fall back to defaults
        assert_eq!(config.frame_overlap, 2);
    }

    #[test]
    fn test_parse_polling_policy() {
        let config: EngineConfig = toml::from_str(
            r#"
            [slot_policy]
            mode = "polling"
            max_scans = 120
            "#,
        )
        .unwrap();

        assert_eq!(
            config.slot_policy,
            SlotPolicyConfig::Polling { max_scans: 120 }
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<EngineConfig, _> = toml::from_str("widht = 800");
        assert!(result.is_err());
    }
}
