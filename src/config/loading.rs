//! Configuration loading from files and environment variables
//!
//! Environment variables override the file so container deployments can
//! change the egress pool without editing the config.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::types::{Config, PoolConfig, SelectionStrategy};

/// Comma-separated subnets overriding `[pool] subnets`
pub const ENV_SUBNETS: &str = "SUBNET_PROXY_SUBNETS";

/// Strategy name overriding `[pool] strategy`
pub const ENV_STRATEGY: &str = "SUBNET_PROXY_STRATEGY";

/// Where the effective configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the config file
    File,
    /// Config file absent, built-in defaults used
    Defaults,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "config file",
            Self::Defaults => "built-in defaults",
        }
    }
}

/// Split a comma-separated subnet list, dropping empty items
pub(crate) fn split_subnet_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply `SUBNET_PROXY_*` overrides from an environment lookup
///
/// Takes the lookup as a closure so tests don't have to mutate the process environment.
fn apply_env_overrides<F>(pool: &mut PoolConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_SUBNETS) {
        let subnets = split_subnet_list(&value);
        info!(
            "Using {} subnet(s) from {} (overriding config file)",
            subnets.len(),
            ENV_SUBNETS
        );
        pool.subnets = subnets;
    }

    if let Some(value) = lookup(ENV_STRATEGY) {
        pool.strategy = value
            .parse::<SelectionStrategy>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", ENV_STRATEGY, e))?;
    }

    Ok(())
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Load configuration from a TOML file, with environment variable overrides
///
/// The result is not validated; callers validate once all overrides,
/// including command-line flags, are applied.
///
/// # Errors
/// Fails if the file cannot be read or parsed, or an override is invalid.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<Config> {
    let config_path = config_path.as_ref();
    let config_content = std::fs::read_to_string(config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        )
    })?;

    let mut config = parse_config(&config_content).map_err(|e| {
        anyhow::anyhow!(
            "Failed to parse config file '{}': {}",
            config_path.display(),
            e
        )
    })?;

    apply_env_overrides(&mut config.pool, process_env)?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Load configuration, falling back to defaults when the file does not exist
///
/// A file that exists but fails to parse is still an error.
///
/// # Errors
/// See [`load_config`].
pub fn load_config_with_fallback(config_path: impl AsRef<Path>) -> Result<(Config, ConfigSource)> {
    let config_path = config_path.as_ref();
    if config_path.exists() {
        return Ok((load_config(config_path)?, ConfigSource::File));
    }

    info!(
        "Config file '{}' not found, using built-in defaults",
        config_path.display()
    );
    let mut config = create_default_config();
    apply_env_overrides(&mut config.pool, process_env)?;
    Ok((config, ConfigSource::Defaults))
}

/// Create a default configuration: listen on 0.0.0.0:1080, no egress pool
#[must_use]
pub fn create_default_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_split_subnet_list() {
        assert_eq!(
            split_subnet_list(" 10.0.0.0/24, ,2001:db8::/64,"),
            vec!["10.0.0.0/24".to_string(), "2001:db8::/64".to_string()]
        );
        assert!(split_subnet_list("").is_empty());
    }

    #[test]
    fn test_env_overrides_pool() {
        let mut pool = PoolConfig {
            subnets: vec!["192.168.0.0/24".to_string()],
            strategy: SelectionStrategy::Hash,
        };

        apply_env_overrides(
            &mut pool,
            env(&[(ENV_SUBNETS, "10.0.0.1,10.0.1.0/24"), (ENV_STRATEGY, "random")]),
        )
        .unwrap();

        assert_eq!(pool.subnets, vec!["10.0.0.1", "10.0.1.0/24"]);
        assert_eq!(pool.strategy, SelectionStrategy::Random);
    }

    #[test]
    fn test_env_absent_keeps_file_values() {
        let mut pool = PoolConfig {
            subnets: vec!["192.168.0.0/24".to_string()],
            strategy: SelectionStrategy::Random,
        };
        let before = pool.clone();

        apply_env_overrides(&mut pool, env(&[])).unwrap();
        assert_eq!(pool, before);
    }

    #[test]
    fn test_env_invalid_strategy() {
        let mut pool = PoolConfig::default();
        let err = apply_env_overrides(&mut pool, env(&[(ENV_STRATEGY, "sticky")])).unwrap_err();
        assert!(err.to_string().contains(ENV_STRATEGY));
    }

    #[test]
    fn test_config_source_names() {
        assert_eq!(ConfigSource::File.as_str(), "config file");
        assert_eq!(ConfigSource::Defaults.as_str(), "built-in defaults");
    }

    #[test]
    fn test_default_config_has_no_pool() {
        let config = create_default_config();
        assert!(!config.pool.is_configured());
        assert!(config.validate().is_ok());
    }
}
