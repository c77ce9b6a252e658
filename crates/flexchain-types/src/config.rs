//! Configuration types for flexchain.
//!
//! `FlexchainConfig` represents the `config.toml` read by the CLI. Every field
//! has a default, so an empty file (or no file) yields a usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexchainConfig {
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Engine-wide defaults applied to chains built from definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default loop limit for loop chains that don't set their own.
    /// `None` means unbounded.
    #[serde(default)]
    pub max_loop_count: Option<u64>,

    /// Whether nested chains read through to their parent's memory.
    #[serde(default = "default_inherit_parent_memory")]
    pub inherit_parent_memory: bool,

    /// Capacity of the broadcast channel behind `Chain::subscribe`.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_inherit_parent_memory() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_count: None,
            inherit_parent_memory: default_inherit_parent_memory(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_loop_count, None);
        assert!(config.inherit_parent_memory);
        assert_eq!(config.event_channel_capacity, 1024);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: FlexchainConfig = toml::from_str("").unwrap();
        assert_eq!(config, FlexchainConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial_engine() {
        let toml_str = r#"
[engine]
max_loop_count = 10
"#;
        let config: FlexchainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_loop_count, Some(10));
        assert!(config.engine.inherit_parent_memory);
        assert_eq!(config.engine.event_channel_capacity, 1024);
    }

    #[test]
    fn test_config_deserialize_full() {
        let toml_str = r#"
[engine]
max_loop_count = 5
inherit_parent_memory = false
event_channel_capacity = 64
"#;
        let config: FlexchainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_loop_count, Some(5));
        assert!(!config.engine.inherit_parent_memory);
        assert_eq!(config.engine.event_channel_capacity, 64);
    }
}
