use super::pool::NodePool;
use async_trait::async_trait;
use mulberry_core::GlobalSettings;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// 节点可达性探测
#[async_trait]
pub trait Probe: Send + Sync {
    /// 返回节点当前是否可达
    async fn probe(&self, address: &Url) -> bool;
}

/// 通过建立TCP连接判断节点是否可达
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &Url) -> bool {
        let Some((host, port)) = socket_target(address) else {
            warn!("Node {} has no host or port to probe", address);
            return false;
        };

        match tokio::time::timeout(self.timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                warn!("Node unreachable: {} ({})", address, e);
                false
            }
            Err(_) => {
                warn!(
                    "Node unreachable: {} (connect timed out after {:?})",
                    address, self.timeout
                );
                false
            }
        }
    }
}

/// 从节点地址中取出 host 和端口，未指定端口时使用 scheme 的默认端口
fn socket_target(address: &Url) -> Option<(String, u16)> {
    let host = address
        .host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = address.port_or_known_default()?;
    Some((host, port))
}

/// 健康检查器
/// 按固定间隔探测所有节点，更新节点状态并修复堆
pub struct HealthMonitor {
    pool: Arc<NodePool>,
    probe: Arc<dyn Probe>,
    check_interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<NodePool>, probe: Arc<dyn Probe>, check_interval: Duration) -> Self {
        Self {
            pool,
            probe,
            check_interval,
        }
    }

    /// 使用TCP探测创建健康检查器
    pub fn from_settings(pool: Arc<NodePool>, settings: &GlobalSettings) -> Self {
        let probe = Arc::new(TcpProbe::new(settings.probe_timeout()));
        Self::new(pool, probe, settings.health_check_interval())
    }

    /// 启动健康检查循环，第一次检查在一个间隔之后执行
    pub async fn start(&self) {
        info!(
            "Starting health checker with interval: {:?}",
            self.check_interval
        );

        let mut interval = interval_at(Instant::now() + self.check_interval, self.check_interval);

        loop {
            interval.tick().await;
            info!("Starting health check...");
            let summary = self.check_now().await;
            debug!(
                "Health check completed: {}/{} nodes active",
                summary.active, summary.total
            );
        }
    }

    /// 在后台任务中运行健康检查循环
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.start().await })
    }

    /// 立即对所有节点执行一次探测
    pub async fn check_now(&self) -> HealthSummary {
        let nodes = self.pool.nodes();
        let mut active = 0;

        for node in &nodes {
            let reachable = self.probe.probe(node.address()).await;
            node.set_health(reachable);

            let status = if reachable {
                active += 1;
                "active"
            } else {
                self.pool.repair_node(node);
                "dead"
            };

            info!("{} [{}] [{:.2}]", node.address(), status, node.weight());
        }

        HealthSummary {
            total: nodes.len(),
            active,
            inactive: nodes.len() - active,
        }
    }
}

/// 一次健康检查的结果统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}
