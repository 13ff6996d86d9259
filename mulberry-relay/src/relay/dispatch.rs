use super::forwarder::{ForwardRequest, Forwarder};
use axum::response::Response;
use mulberry_core::GlobalSettings;
use mulberry_loadbalance::NodePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 请求分发失败的原因，都会以503返回给客户端
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Downtime: No nodes available")]
    NoNodesAvailable,
    #[error("Service not available")]
    MaxAttemptsReached { attempts: u32 },
}

/// 单个请求的重试状态，按值在分发循环中传递
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchState {
    /// 已尝试的节点次数（从1开始）
    pub attempts: u32,
    /// 当前节点上的重试次数
    pub retries: u32,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self {
            attempts: 1,
            retries: 0,
        }
    }
}

impl DispatchState {
    /// 在同一节点上再试一次
    pub fn next_retry(self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self
        }
    }

    /// 切换节点，重试计数清零
    pub fn next_attempt(self) -> Self {
        Self {
            attempts: self.attempts + 1,
            retries: 0,
        }
    }
}

/// 重试与故障转移的上限
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
        }
    }
}

/// 请求分发器
///
/// 选择节点、转发请求，传输失败时先在同一节点上重试，重试用尽后切换节点。
/// 第 `max_attempts` 次切换时，失败的节点会被标记为失效。
pub struct Dispatcher {
    pool: Arc<NodePool>,
    forwarder: Arc<dyn Forwarder>,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(pool: Arc<NodePool>, forwarder: Arc<dyn Forwarder>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            forwarder,
            policy,
        }
    }

    pub async fn dispatch(&self, request: &ForwardRequest) -> Result<Response, DispatchError> {
        self.dispatch_with_state(request, DispatchState::default())
            .await
    }

    pub async fn dispatch_with_state(
        &self,
        request: &ForwardRequest,
        mut state: DispatchState,
    ) -> Result<Response, DispatchError> {
        loop {
            if state.attempts > self.policy.max_attempts {
                warn!(
                    "{} Max attempts reached, terminating",
                    request.describe()
                );
                return Err(DispatchError::MaxAttemptsReached {
                    attempts: state.attempts,
                });
            }

            let Some(node) = self.pool.select_best() else {
                warn!("{} No nodes available", request.describe());
                return Err(DispatchError::NoNodesAvailable);
            };
            debug!(
                "{} -> {} (attempt {})",
                request.describe(),
                node.address(),
                state.attempts
            );

            loop {
                match self.forwarder.forward(&node, request).await {
                    Ok(response) => {
                        self.pool.decay_served(&node);
                        return Ok(response);
                    }
                    Err(e) => {
                        warn!("[{}] {}", node.address(), e);
                        if state.retries >= self.policy.max_retries {
                            break;
                        }
                        tokio::time::sleep(self.policy.retry_delay).await;
                        state = state.next_retry();
                    }
                }
            }

            let failed = state.attempts;
            state = state.next_attempt();
            info!("{} Attempting retry {}", request.describe(), failed);

            if failed >= self.policy.max_attempts {
                warn!("Marking node {} as dead", node.address());
                self.pool.mark_dead(node.address());
            }
        }
    }
}
