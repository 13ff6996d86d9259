use crate::config::model::{Config, ConfigError};
use std::path::Path;

pub fn load_config_from_path(config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let config_path = config_path.as_ref();
    tracing::debug!("Loading configuration from {}", config_path.display());
    let config_str = std::fs::read_to_string(config_path)?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(config_str)?;
    Ok(config)
}

/// 将配置序列化为 TOML 字符串
pub fn to_toml_string(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}
