use mulberry_core::Config;
use mulberry_loadbalance::{HealthMonitor, NodePool};
use mulberry_relay::{Dispatcher, Forwarder, HttpForwarder, LoadBalancedHandler, RetryPolicy};

use anyhow::Result;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 应用状态，包含节点池和代理处理器
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<NodePool>,
    pub handler: Arc<LoadBalancedHandler>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 使用 HTTP 转发器创建应用状态
    pub fn new(config: Config) -> Result<Self> {
        let forwarder = Arc::new(HttpForwarder::new(config.settings.request_timeout())?);
        Self::with_forwarder(config, forwarder)
    }

    pub fn with_forwarder(config: Config, forwarder: Arc<dyn Forwarder>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(NodePool::from_config(&config)?);
        let dispatcher = Arc::new(Dispatcher::new(
            pool.clone(),
            forwarder,
            RetryPolicy::from_settings(&config.settings),
        ));
        let handler = Arc::new(LoadBalancedHandler::new(
            dispatcher,
            config.settings.max_body_bytes,
        ));

        Ok(Self {
            pool,
            handler,
            config: Arc::new(config),
        })
    }
}

/// 所有请求都交给负载均衡处理器
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    state.handler.handle(request).await
}

/// 创建应用路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 初始化日志，未设置 RUST_LOG 时默认 info
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// 启动健康检查和代理服务器
pub async fn start_server(config: Config) -> Result<()> {
    info!("Starting Mulberry load balancer...");

    let app_state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            return Err(e);
        }
    };

    let settings = &app_state.config.settings;
    info!(
        "{} nodes configured, selection mode: {}",
        app_state.pool.len(),
        settings.selection_mode
    );
    for node in app_state.pool.nodes() {
        info!("Configured server: {}", node.address());
    }

    let monitor = Arc::new(HealthMonitor::from_settings(app_state.pool.clone(), settings));
    let health_task = monitor.spawn();

    let app = create_app(app_state.clone());

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.port));
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Load Balancer started at :{}", listener.local_addr()?.port());

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await;

    health_task.abort();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}
