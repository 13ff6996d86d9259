//! Mulberry Relay Library
//!
//! 请求转发与故障转移：
//! - 转发器（`Forwarder` / `HttpForwarder`）
//! - 分发器（同节点重试、切换节点、标记失效节点）
//! - axum 代理处理器

pub mod relay;

// Re-export commonly used types
pub use relay::handler::LoadBalancedHandler;
pub use relay::{
    DispatchError, DispatchState, Dispatcher, ForwardError, ForwardRequest, Forwarder,
    HttpForwarder, RetryPolicy,
};
