//! 这个文件单独运行在一个测试进程中，修改代理环境变量不会影响其他测试

use axum::http::{HeaderMap, Method};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use mulberry_loadbalance::Node;
use mulberry_relay::{ForwardRequest, Forwarder, HttpForwarder};
use reqwest::Url;
use std::time::Duration;

#[tokio::test]
async fn test_forwarder_ignores_proxy_environment() {
    // 指向一个已关闭的端口，如果转发走了代理就会失败
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let proxy = format!("http://{}", closed);
    for name in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
        std::env::set_var(name, &proxy);
    }
    for name in ["NO_PROXY", "no_proxy"] {
        std::env::remove_var(name);
    }

    let app = Router::new().route("/", get(|| async { "direct" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let forwarder = HttpForwarder::new(Duration::from_secs(2)).unwrap();
    let node = Node::new(Url::parse(&format!("http://{}", addr)).unwrap(), 1.0);
    let request = ForwardRequest {
        method: Method::GET,
        path_and_query: "/".to_string(),
        headers: HeaderMap::new(),
        body: Bytes::new(),
        client_addr: None,
    };

    let response = forwarder.forward(&node, &request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, Bytes::from_static(b"direct"));
}
