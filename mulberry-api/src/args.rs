use anyhow::{bail, Context, Result};
use clap::Parser;
use mulberry_core::config::loader::load_config_from_path;
use mulberry_core::Config;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3030;

/// 命令行参数，优先级高于配置文件
#[derive(Parser, Debug, Default)]
#[command(name = "mulberry")]
#[command(about = "Weighted-heap HTTP load balancer")]
pub struct Args {
    /// Load balanced backends, use commas to separate
    #[arg(long)]
    pub node_list: Option<String>,

    /// Port to serve
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to a TOML configuration file
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// 合并配置文件和命令行参数，并验证结果
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config_from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => {
                let Some(node_list) = &self.node_list else {
                    bail!("Please provide one or more nodes to load balance (--node-list or --config)");
                };
                Config::from_node_list(node_list, DEFAULT_PORT)?
            }
        };

        if let Some(node_list) = &self.node_list {
            config.nodes = Config::from_node_list(node_list, config.port)?.nodes;
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mulberry_core::SelectionMode;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mulberry-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_node_list_only() {
        let args = Args::try_parse_from([
            "mulberry",
            "--node-list",
            "http://127.0.0.1:8081, http://127.0.0.1:8082",
            "--port",
            "4000",
        ])
        .unwrap();

        let config = args.resolve_config().unwrap();
        assert_eq!(
            config.nodes,
            vec!["http://127.0.0.1:8081", "http://127.0.0.1:8082"]
        );
        assert_eq!(config.port, 4000);
    }

    #[test]
    fn test_default_port() {
        let args = Args {
            node_list: Some("http://127.0.0.1:8081".to_string()),
            ..Args::default()
        };
        assert_eq!(args.resolve_config().unwrap().port, 3030);
    }

    #[test]
    fn test_missing_nodes_fails() {
        assert!(Args::default().resolve_config().is_err());

        let args = Args {
            node_list: Some(" , ".to_string()),
            ..Args::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_address_without_scheme_fails() {
        let args = Args {
            node_list: Some("127.0.0.1:8081".to_string()),
            ..Args::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = write_config(
            "override",
            r#"
nodes = ["http://127.0.0.1:9001"]
port = 5000

[settings]
selection_mode = "root"
"#,
        );

        let args = Args {
            config: Some(path.clone()),
            ..Args::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.settings.selection_mode, SelectionMode::Root);

        let args = Args {
            config: Some(path.clone()),
            node_list: Some("http://127.0.0.1:9002,http://127.0.0.1:9003".to_string()),
            port: Some(6000),
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.port, 6000);
        assert_eq!(config.settings.selection_mode, SelectionMode::Root);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_config_file_fails() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/mulberry.toml")),
            ..Args::default()
        };
        assert!(args.resolve_config().is_err());
    }
}
