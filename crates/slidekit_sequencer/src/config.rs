// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequencer settings.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables of the sequencer, stored as RON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Debounce delay between an edit and the sync it triggers
    pub rebuild_delay_ms: u64,
    /// Duration of generated dim and hide nodes
    pub after_effect_duration: f64,
    /// Duration of a motion path effect when none is given
    pub motion_path_default_duration: f64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rebuild_delay_ms: 50,
            after_effect_duration: 0.001,
            motion_path_default_duration: 2.0,
        }
    }
}

impl SequencerConfig {
    /// Debounce delay as a duration
    pub fn rebuild_delay(&self) -> Duration {
        Duration::from_millis(self.rebuild_delay_ms)
    }

    /// Parse settings from RON; missing fields keep their defaults
    pub fn from_ron(source: &str) -> Result<Self> {
        Ok(ron::from_str(source)?)
    }

    /// Serialize settings to pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&content)?;
        tracing::debug!("Loaded sequencer config from {}", path.display());
        Ok(config)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.rebuild_delay(), Duration::from_millis(50));
        assert_eq!(config.after_effect_duration, 0.001);
        assert_eq!(config.motion_path_default_duration, 2.0);
    }

    #[test]
    fn test_partial_ron() {
        let config = SequencerConfig::from_ron("(rebuild_delay_ms: 10)").unwrap();
        assert_eq!(config.rebuild_delay_ms, 10);
        assert_eq!(config.motion_path_default_duration, 2.0);
    }

    #[test]
    fn test_serialization() {
        let config = SequencerConfig {
            rebuild_delay_ms: 120,
            ..Default::default()
        };
        let text = config.to_ron().unwrap();
        assert!(text.contains("SequencerConfig"));
        assert_eq!(SequencerConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_ron() {
        assert!(SequencerConfig::from_ron("(rebuild_delay_ms: \"soon\")").is_err());
    }
}
