//! Configuration file loading.
//!
//! Reads `config.toml` into [`FlexchainConfig`], falling back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use flexchain_types::config::FlexchainConfig;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV: &str = "FLEXCHAIN_CONFIG";

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag
/// 2. `FLEXCHAIN_CONFIG` environment variable
/// 3. `~/.flexchain/config.toml`
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    // ./.flexchain without a home directory
    dirs::home_dir()
        .map(|home| home.join(".flexchain"))
        .unwrap_or_else(|| PathBuf::from(".flexchain"))
        .join("config.toml")
}

/// Load configuration from `path`.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: logs a warning, then defaults.
pub async fn load_config(path: &Path) -> FlexchainConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return FlexchainConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return FlexchainConfig::default();
        }
    };

    match toml::from_str::<FlexchainConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            FlexchainConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).await;
        assert_eq!(config.engine.max_loop_count, None);
        assert!(config.engine.inherit_parent_memory);
        assert_eq!(config.engine.event_channel_capacity, 1024);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[engine]
max_loop_count = 25
inherit_parent_memory = false
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.engine.max_loop_count, Some(25));
        assert!(!config.engine.inherit_parent_memory);
        assert_eq!(config.engine.event_channel_capacity, 1024);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.engine.max_loop_count, None);
    }

    #[test]
    fn resolve_config_path_prefers_flag() {
        let path = resolve_config_path(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn resolve_config_path_defaults_to_config_toml() {
        let path = resolve_config_path(None);
        assert!(path.ends_with("config.toml"));
    }
}
