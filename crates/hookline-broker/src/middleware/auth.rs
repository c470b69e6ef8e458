//! Session-token authentication middleware.

use axum::http::StatusCode;
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::bearer_token;

/// Tower layer that requires a valid session token in the Authorization
/// header. Applied to the channel minting endpoint when token gating is
/// enabled.
#[derive(Clone)]
pub struct SessionAuthLayer {
    secret: Arc<Vec<u8>>,
}

impl SessionAuthLayer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: Arc::new(secret.to_vec()),
        }
    }
}

impl<S> Layer<S> for SessionAuthLayer {
    type Service = SessionAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionAuthService {
            inner,
            secret: self.secret.clone(),
        }
    }
}

/// The service wrapper that performs session-token validation.
#[derive(Clone)]
pub struct SessionAuthService<S> {
    inner: S,
    secret: Arc<Vec<u8>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SessionAuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
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
        let secret = self.secret.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let token = match bearer_token(req.headers()) {
                Some(token) => token,
                None => {
                    tracing::debug!("missing authorization token");
                    return Ok(unauthorized_response());
                }
            };

            match hookline_auth::validate_session_token(&secret, token) {
                Ok(claims) => {
                    tracing::debug!(subject = %claims.sub, "session token validated");
                    inner.call(req).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "session token rejected");
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

fn unauthorized_response<B: Default>() -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        http::header::WWW_AUTHENTICATE,
        http::HeaderValue::from_static("Bearer realm=\"hookline\""),
    );
    response
}
