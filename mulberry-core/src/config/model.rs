use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Please provide one or more nodes to load balance")]
    EmptyNodeList,
    #[error("Invalid node address '{address}': {reason}")]
    InvalidNodeAddress { address: String, reason: String },
    #[error("Invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 后端节点地址列表，例如 "http://127.0.0.1:8081"
    pub nodes: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// 单个请求最多切换节点的次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 同一节点上的重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_initial_weight")]
    pub initial_weight: f64,
    #[serde(default)]
    pub selection_mode: SelectionMode,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            request_timeout_seconds: default_request_timeout(),
            max_attempts: default_max_attempts(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            initial_weight: default_initial_weight(),
            selection_mode: SelectionMode::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl GlobalSettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// 选择策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// 直接返回堆顶节点，不检查是否活跃
    Root,
    /// 堆顶不活跃时线性查找第一个活跃节点
    #[default]
    Fallback,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Root => write!(f, "root"),
            SelectionMode::Fallback => write!(f, "fallback"),
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    3030
}

fn default_health_check_interval() -> u64 {
    120 // 2分钟检查一次
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    10
}

fn default_initial_weight() -> f64 {
    1.0
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Config {
    /// 从逗号分隔的节点列表构建配置，其余设置使用默认值
    pub fn from_node_list(node_list: &str, port: u16) -> Result<Self, ConfigError> {
        let nodes: Vec<String> = node_list
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if nodes.is_empty() {
            return Err(ConfigError::EmptyNodeList);
        }

        Ok(Self {
            nodes,
            port,
            settings: GlobalSettings::default(),
        })
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.node_urls()?;
        self.validate_settings()
    }

    /// 解析所有节点地址，要求带有 http/https scheme 和 host
    pub fn node_urls(&self) -> Result<Vec<Url>, ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::EmptyNodeList);
        }

        self.nodes.iter().map(|node| parse_node_url(node)).collect()
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        let settings = &self.settings;

        if settings.health_check_interval_seconds == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "health_check_interval_seconds",
                reason: "cannot be 0".to_string(),
            });
        }

        if settings.probe_timeout_seconds == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "probe_timeout_seconds",
                reason: "cannot be 0".to_string(),
            });
        }

        if settings.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "request_timeout_seconds",
                reason: "cannot be 0".to_string(),
            });
        }

        if settings.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        if !settings.initial_weight.is_finite() || settings.initial_weight <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "initial_weight",
                reason: format!("must be a positive number, got {}", settings.initial_weight),
            });
        }

        if settings.max_body_bytes == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_body_bytes",
                reason: "cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_node_url(address: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(address).map_err(|e| ConfigError::InvalidNodeAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidNodeAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme '{}', must be http or https", url.scheme()),
        });
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidNodeAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
