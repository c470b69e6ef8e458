//! Full-stack scenario: real broker, real agent, real local target.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Router;
use hookline_agent::AgentConfig;
use hookline_broker::cluster::StaticPeerDirectory;
use hookline_broker::{server, Broker, BrokerConfig};
use hookline_proto::ChannelInventory;
use tokio_util::sync::CancellationToken;

async fn start_broker(config: BrokerConfig) -> (Arc<Broker>, std::net::SocketAddr) {
    let mut config = config;
    config.advertise_ip = Some("127.0.0.1".parse().unwrap());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.port = addr.port();

    let cancel = CancellationToken::new();
    let broker = Broker::new(
        config,
        Arc::new(StaticPeerDirectory::default()),
        cancel.clone(),
    )
    .unwrap();

    let serve_broker = broker.clone();
    tokio::spawn(async move {
        server::serve(listener, serve_broker, cancel).await.unwrap();
    });

    (broker, addr)
}

/// Local target that reflects headers and body, like `hookline echo`.
async fn start_echo() -> std::net::SocketAddr {
    async fn echo(headers: HeaderMap, body: Bytes) -> Response {
        let mut response = Response::new(Body::from(body));
        for (name, value) in &headers {
            if name == http::header::HOST || name == http::header::CONTENT_LENGTH {
                continue;
            }
            response.headers_mut().append(name, value.clone());
        }
        response
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(echo))
            .await
            .unwrap();
    });
    addr
}

async fn wait_for_attached_channel(addr: std::net::SocketAddr) -> String {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let inventory: ChannelInventory = client
            .get(format!("http://{addr}/internal/channels"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if let Some(id) = inventory.webhook_channels.iter().next() {
            return id.clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent never attached");
}

#[tokio::test]
async fn webhook_flows_through_agent_to_local_target() {
    let (_broker, broker_addr) = start_broker(BrokerConfig::default()).await;
    let echo_addr = start_echo().await;

    let agent_cancel = CancellationToken::new();
    let config = AgentConfig {
        server_url: format!("http://{broker_addr}"),
        target_url: format!("http://{echo_addr}"),
        insecure: false,
        transfer_timeout: Some(Duration::from_secs(5)),
        session_token: None,
    };
    let run_cancel = agent_cancel.clone();
    let agent = tokio::spawn(async move { hookline_agent::run(config, run_cancel).await });

    let channel = wait_for_attached_channel(broker_addr).await;

    let response = reqwest::Client::new()
        .post(format!("http://{broker_addr}/webhook/{channel}/payload"))
        .header("x-test-marker", "roundtrip")
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-test-marker"], "roundtrip");
    assert_eq!(response.text().await.unwrap(), "hello");

    agent_cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), agent)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn agent_sends_bad_gateway_when_target_is_down() {
    let (_broker, broker_addr) = start_broker(BrokerConfig::default()).await;

    let agent_cancel = CancellationToken::new();
    let config = AgentConfig {
        server_url: format!("http://{broker_addr}"),
        // nothing listens here
        target_url: "http://127.0.0.1:1".to_owned(),
        insecure: false,
        transfer_timeout: Some(Duration::from_millis(500)),
        session_token: None,
    };
    let run_cancel = agent_cancel.clone();
    let _agent = tokio::spawn(async move { hookline_agent::run(config, run_cancel).await });

    let channel = wait_for_attached_channel(broker_addr).await;

    let response = reqwest::Client::new()
        .post(format!("http://{broker_addr}/webhook/{channel}"))
        .body("anyone?")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    agent_cancel.cancel();
}

#[tokio::test]
async fn agent_aborts_mint_retries_on_unauthorized() {
    let (_broker, broker_addr) = start_broker(BrokerConfig {
        secret: Some("gated-secret".to_owned()),
        ..Default::default()
    })
    .await;

    let config = AgentConfig {
        server_url: format!("http://{broker_addr}"),
        target_url: "http://127.0.0.1:1".to_owned(),
        insecure: false,
        transfer_timeout: None,
        session_token: None,
    };

    // Without a session token the mint is rejected outright; the skip
    // wrapper must surface it immediately instead of retrying for ~30s.
    let started = std::time::Instant::now();
    let result = hookline_agent::run(config, CancellationToken::new()).await;
    assert!(matches!(result, Err(hookline_agent::AgentError::Unauthorized)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
