//! `hookline echo`: a trivial local target that reflects requests.

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let app = Router::new().fallback(echo_handler);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "echo server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("echo server stopped");
    Ok(())
}

/// Reflects the request's headers and body back to the caller.
async fn echo_handler(headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    for (name, value) in &headers {
        if name == HOST || name == CONTENT_LENGTH {
            continue;
        }
        response.headers_mut().append(name, value.clone());
    }
    response
}
