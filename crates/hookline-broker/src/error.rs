//! Broker error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("channel not found or not connected")]
    NotFound,

    #[error("channel not minted on this broker")]
    Forbidden,

    #[error("channel already attached")]
    Conflict,

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("timed out waiting for tunnel response")]
    Timeout,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing or invalid token")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::NotFound => StatusCode::NOT_FOUND,
            BrokerError::Forbidden => StatusCode::FORBIDDEN,
            BrokerError::Conflict => StatusCode::CONFLICT,
            BrokerError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            BrokerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            BrokerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BrokerError::Unauthorized => StatusCode::UNAUTHORIZED,
            BrokerError::Internal(_) | BrokerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay out of external responses
        let message = match &self {
            BrokerError::Internal(_) | BrokerError::Io(_) => "internal server error".to_owned(),
            other => other.to_string(),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(BrokerError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(BrokerError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(BrokerError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            BrokerError::BadGateway("tunnel write failed".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BrokerError::Timeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            BrokerError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let response = BrokerError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
