use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::relay::dispatch::Dispatcher;
use crate::relay::forwarder::ForwardRequest;

use super::types::{create_error_response, ErrorType};

/// 负载均衡的反向代理处理器
pub struct LoadBalancedHandler {
    dispatcher: Arc<Dispatcher>,
    max_body_bytes: usize,
}

impl LoadBalancedHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            max_body_bytes,
        }
    }

    /// 缓冲请求体，然后交给分发器选择节点并转发
    pub async fn handle(&self, request: Request) -> Response {
        let start_time = Instant::now();
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let (parts, body) = request.into_parts();

        let body = match buffer_body(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(ErrorType::PayloadTooLarge) => {
                return create_error_response(ErrorType::PayloadTooLarge, "Request body too large");
            }
            Err(error_type) => {
                return create_error_response(error_type, "Failed to read request body");
            }
        };

        let forward_request = ForwardRequest::from_parts(&parts, body, client_addr);
        match self.dispatcher.dispatch(&forward_request).await {
            Ok(response) => {
                tracing::debug!(
                    "{} completed with {} in {:?}",
                    forward_request.describe(),
                    response.status(),
                    start_time.elapsed()
                );
                response
            }
            Err(e) => {
                tracing::error!("{} failed: {}", forward_request.describe(), e);
                e.into_response()
            }
        }
    }
}

/// 读取完整请求体，超过 `limit` 字节时返回 `PayloadTooLarge`
async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, ErrorType> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if is_length_limit(&e) {
            tracing::warn!("Request body exceeds limit of {} bytes", limit);
            ErrorType::PayloadTooLarge
        } else {
            tracing::warn!("Failed to read request body: {}", e);
            ErrorType::BadRequest
        }
    })
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
