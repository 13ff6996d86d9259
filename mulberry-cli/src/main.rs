//! Mulberry CLI Tool
//!
//! Command line interface for checking Mulberry configurations and backends

use anyhow::Result;
use clap::{Parser, Subcommand};
use mulberry_core::config::loader::{load_config_from_path, to_toml_string};
use mulberry_core::Config;
use mulberry_loadbalance::{HealthMonitor, NodePool, PoolSnapshot};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mulberry-cli")]
#[command(about = "A CLI tool for managing the Mulberry load balancer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Probe every configured node once
    HealthCheck {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Print the pool snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
        /// Nodes to include, use commas to separate
        #[arg(long, default_value = "http://127.0.0.1:8081,http://127.0.0.1:8082")]
        node_list: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config).and_then(|cfg| cfg.validate().map(|_| cfg)) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - {} nodes configured", cfg.nodes.len());
                    println!("  - port {}", cfg.port);
                    println!("  - selection mode {}", cfg.settings.selection_mode);
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::HealthCheck { config, json } => {
            println!("Performing health check...");
            let cfg = load_config_from_path(&config)?;
            cfg.validate()?;

            let snapshot = run_health_check(&cfg).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", render_table(&snapshot));
            }

            if snapshot.active_count() == 0 {
                eprintln!("❌ No reachable nodes");
                std::process::exit(1);
            }
            println!(
                "✅ {}/{} nodes reachable",
                snapshot.active_count(),
                snapshot.nodes.len()
            );
        }
        Commands::GenerateConfig { output, node_list } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output, &node_list)?;
            println!("✅ Configuration file generated successfully");
        }
    }

    Ok(())
}

/// 对所有节点执行一轮探测，返回探测后的节点池快照
async fn run_health_check(config: &Config) -> Result<PoolSnapshot> {
    let pool = Arc::new(NodePool::from_config(config)?);
    let monitor = HealthMonitor::from_settings(pool.clone(), &config.settings);
    let summary = monitor.check_now().await;
    tracing::debug!(
        "Health check completed: {}/{} nodes active",
        summary.active,
        summary.total
    );
    Ok(pool.snapshot())
}

fn render_table(snapshot: &PoolSnapshot) -> String {
    let width = snapshot
        .nodes
        .iter()
        .map(|n| n.address.len())
        .max()
        .unwrap_or(0)
        .max("ADDRESS".len());

    let mut table = format!(
        "{:<4} {:<width$} {:<7} {:>8}\n",
        "POS",
        "ADDRESS",
        "STATUS",
        "WEIGHT",
        width = width
    );
    for node in &snapshot.nodes {
        table.push_str(&format!(
            "{:<4} {:<width$} {:<7} {:>8.2}\n",
            node.position,
            node.address,
            if node.active { "active" } else { "dead" },
            node.weight,
            width = width
        ));
    }
    table
}

/// 生成配置文件
fn generate_config_file(output_path: &str, node_list: &str) -> Result<()> {
    let config = Config::from_node_list(node_list, 3030)?;
    config.validate()?;

    let content = format!(
        "# Mulberry Configuration File\n# CLI flags --node-list and --port override these values\n\n{}",
        to_toml_string(&config)?
    );
    std::fs::write(output_path, content)?;
    Ok(())
}
