use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use bytes::Bytes;
use mulberry_loadbalance::Node;
use reqwest::Url;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 转发错误
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// 已缓冲的入站请求，可以在重试和切换节点时重复发送
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl ForwardRequest {
    pub fn from_parts(
        parts: &axum::http::request::Parts,
        body: Bytes,
        client_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: parts.method.clone(),
            path_and_query: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            headers: parts.headers.clone(),
            body,
            client_addr,
        }
    }

    /// 用于日志的请求描述，例如 `127.0.0.1:51234(/api)`
    pub fn describe(&self) -> String {
        let client = self
            .client_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!("{}({})", client, self.path_and_query)
    }
}

/// 节点的代理句柄：把请求转发到指定节点
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, node: &Node, request: &ForwardRequest)
        -> Result<Response, ForwardError>;
}

/// 逐跳头部，不在代理两端之间传递
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// 基于 reqwest 的HTTP转发器
///
/// 只有传输层错误（连接失败、超时）才算转发失败，后端返回的任何状态码
/// 都会原样流式返回给客户端。
pub struct HttpForwarder {
    client: reqwest::Client,
    response_timeout: Duration,
}

impl HttpForwarder {
    /// `response_timeout` 限制连接和等待响应头的时间，不限制响应体的传输。
    /// 转发直连节点，忽略 `HTTP_PROXY` 等环境变量，与健康检查的连接方式一致。
    pub fn new(response_timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .connect_timeout(response_timeout)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            response_timeout,
        })
    }

    fn build_headers(request: &ForwardRequest) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(request.headers.len() + 3);

        for (name, value) in &request.headers {
            if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        if let Some(host) = request.headers.get(header::HOST) {
            headers.insert("x-forwarded-host", host.clone());
        }

        if let Some(addr) = request.client_addr {
            let client_ip = addr.ip().to_string();
            let forwarded_for = match request
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                Some(prior) => format!("{}, {}", prior, client_ip),
                None => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert("x-forwarded-for", value);
            }
        }

        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        headers
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        node: &Node,
        request: &ForwardRequest,
    ) -> Result<Response, ForwardError> {
        let url = upstream_url(node.address(), &request.path_and_query)?;
        debug!("Forwarding {} {} to {}", request.method, request.path_and_query, url);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(Self::build_headers(request));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let upstream = tokio::time::timeout(self.response_timeout, builder.send())
            .await
            .map_err(|_| ForwardError::Timeout(self.response_timeout))??;

        let status = upstream.status();
        let mut headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// 将请求路径和查询参数拼接到节点地址上
pub fn upstream_url(base: &Url, path_and_query: &str) -> Result<Url, ForwardError> {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);

    let query = match (base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(base_query), Some(query)) => Some(format!("{}&{}", base_query, query)),
        (Some(base_query), None) => Some(base_query.to_string()),
        (None, Some(query)) => Some(query.to_string()),
        (None, None) => None,
    };
    url.set_query(query.as_deref());

    if url.host_str().is_none() {
        return Err(ForwardError::InvalidUrl(url.to_string()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use mulberry_loadbalance::Node;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_upstream_url_joins_paths() {
        let url = upstream_url(&base("http://127.0.0.1:8081"), "/api/users?page=1").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/api/users?page=1");

        let url = upstream_url(&base("http://127.0.0.1:8081/v1/"), "/models").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/v1/models");

        let url = upstream_url(&base("http://127.0.0.1:8081"), "/").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/");
    }

    #[test]
    fn test_upstream_url_merges_queries() {
        let url = upstream_url(&base("http://backend/?key=abc"), "/search?q=rust").unwrap();
        assert_eq!(url.as_str(), "http://backend/search?key=abc&q=rust");

        let url = upstream_url(&base("http://backend/?key=abc"), "/search").unwrap();
        assert_eq!(url.as_str(), "http://backend/search?key=abc");
    }

    #[test]
    fn test_forward_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("lb.example.com"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        let request = ForwardRequest {
            method: Method::GET,
            path_and_query: "/".to_string(),
            headers,
            body: Bytes::new(),
            client_addr: Some("192.168.1.5:40000".parse().unwrap()),
        };

        let headers = HttpForwarder::build_headers(&request);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(headers["x-custom"], "1");
        assert_eq!(headers["x-forwarded-host"], "lb.example.com");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 192.168.1.5");
        assert_eq!(headers["x-forwarded-proto"], "http");
    }

    async fn spawn_backend() -> SocketAddr {
        let app = Router::new()
            .route("/hello", get(|| async { "hello from backend" }))
            .route(
                "/echo",
                axum::routing::post(|body: String| async move { body }),
            )
            .route(
                "/error",
                get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn request(method: Method, path: &str, body: &'static str) -> ForwardRequest {
        ForwardRequest {
            method,
            path_and_query: path.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            client_addr: None,
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_http_forwarder_streams_response() {
        let addr = spawn_backend().await;
        let node = Node::new(base(&format!("http://{}", addr)), 1.0);
        let forwarder = HttpForwarder::new(Duration::from_secs(5)).unwrap();

        let response = forwarder
            .forward(&node, &request(Method::GET, "/hello", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(body_text(response).await, "hello from backend");

        let response = forwarder
            .forward(&node, &request(Method::POST, "/echo", "ping"))
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "ping");
    }

    #[tokio::test]
    async fn test_http_forwarder_passes_server_errors_through() {
        let addr = spawn_backend().await;
        let node = Node::new(base(&format!("http://{}", addr)), 1.0);
        let forwarder = HttpForwarder::new(Duration::from_secs(5)).unwrap();

        let response = forwarder
            .forward(&node, &request(Method::GET, "/error", ""))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(body_text(response).await, "boom");
    }

    #[tokio::test]
    async fn test_http_forwarder_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let node = Node::new(base(&format!("http://{}", addr)), 1.0);
        let forwarder = HttpForwarder::new(Duration::from_secs(2)).unwrap();

        let result = forwarder
            .forward(&node, &request(Method::GET, "/hello", ""))
            .await;
        assert!(matches!(result, Err(ForwardError::Request(_))));
    }
}
