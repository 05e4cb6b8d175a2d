use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gitseal_common::protocol::api::ErrorCode;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::seal::SealError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Error envelope returned by every daemon route:
/// `{"error": {code, message, retryable, request_id, details}}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Value,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: json!({}), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<SealError> for ApiError {
    fn from(seal: SealError) -> Self {
        let code = seal.code();
        let diagnostic = seal.diagnostic();
        if code.manual_intervention_required() {
            error!(code = code.as_str(), message = %seal, diagnostic = ?diagnostic, "flow needs manual intervention");
        } else if code.http_status() >= 500 {
            warn!(code = code.as_str(), message = %seal, diagnostic = ?diagnostic, "flow failed");
        }

        let api = Self::new(code, seal.to_string());
        if code.manual_intervention_required() {
            api.with_details(json!({ "manual_intervention_required": true }))
        } else {
            api
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            status,
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                    "details": self.details,
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        serde_json::from_slice(&body).expect("error response body should be valid json")
    }

    #[tokio::test]
    async fn api_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            ApiError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-scoped-123");
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["error"]["retryable"], true);
        assert_eq!(parsed["error"]["request_id"], "req-scoped-123");
        assert_eq!(parsed["error"]["details"], json!({}));
    }

    #[tokio::test]
    async fn explicit_request_id_overrides_scope() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            ApiError::from_code(ErrorCode::IdentityMismatch)
                .with_request_id("req-explicit-456")
                .into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["request_id"], "req-explicit-456");
    }

    #[tokio::test]
    async fn seal_errors_map_to_status_and_code() {
        let response = ApiError::from(SealError::IntegrityViolation).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "CONTENT_MODIFIED");
        assert_eq!(parsed["error"]["message"], "content modified since lock");
        assert_eq!(parsed["error"]["retryable"], false);
        assert_eq!(parsed["error"]["request_id"], Value::Null);

        let response =
            ApiError::from(SealError::key_possession("Signing key [redacted] is not usable"))
                .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["code"], "KEY_POSSESSION_FAILED");
    }

    #[tokio::test]
    async fn rollback_failure_flags_manual_intervention() {
        let response = ApiError::from(SealError::CriticalFailure(
            "Commit was not signed and rollback failed; manual intervention required".into(),
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "ROLLBACK_FAILED");
        assert_eq!(parsed["error"]["details"]["manual_intervention_required"], true);
    }

    #[test]
    fn request_id_is_taken_from_header_or_generated() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(request_id_from_headers_or_generate(&headers), "abc");

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("  "));
        let generated = request_id_from_headers_or_generate(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
