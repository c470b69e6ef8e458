//! Request logging middleware.
//!
//! Logs one start and one completion event per request with a
//! correlation id taken from `x-request-id` (or freshly stamped).
//! High-cadence poller endpoints are skipped.

use http::{Request, Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

/// Paths polled on a steady cadence by the proxy and peers.
const SKIP_PATHS: &[&str] = &["/healthz", "/traefik-config", "/internal/channels"];

#[derive(Clone, Default)]
pub struct RequestLogLayer;

impl RequestLogLayer {
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService { inner }
    }
}

#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let path = req.uri().path().to_owned();

        if SKIP_PATHS.contains(&path.as_str()) {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let request_id = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %req.method(),
            path = %path,
        );

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                tracing::info!("request started");
                let start = Instant::now();
                let response = inner.call(req).await;

                if let Ok(ref resp) = response {
                    tracing::info!(
                        status = resp.status().as_u16(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "request completed"
                    );
                }
                response
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::StatusCode;
    use tower::ServiceExt;

    async fn ok_service(_req: Request<Body>) -> Result<Response<Body>, std::convert::Infallible> {
        Ok(Response::new(Body::empty()))
    }

    #[tokio::test]
    async fn passes_requests_through() {
        let service = RequestLogLayer::new().layer(tower::service_fn(ok_service));
        let req = Request::builder()
            .uri("/webhook/c1")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn skipped_paths_pass_through_too() {
        let service = RequestLogLayer::new().layer(tower::service_fn(ok_service));
        let req = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
