//! RFC 9457 Problem Details wrapper and `ProxyError` status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use qbfleet_api_models::{ProblemDetails, ProblemInvalidParam};
use qbfleet_core::ProxyError;

use crate::http::constants::{
    PROBLEM_BAD_GATEWAY, PROBLEM_BAD_REQUEST, PROBLEM_CONFLICT, PROBLEM_GATEWAY_TIMEOUT,
    PROBLEM_INTERNAL, PROBLEM_NOT_FOUND, PROBLEM_SERVICE_UNAVAILABLE,
};

/// Structured API error rendered as an RFC 9457 Problem Details body.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    invalid_params: Option<Vec<ProblemInvalidParam>>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_params(mut self, params: Vec<ProblemInvalidParam>) -> Self {
        self.invalid_params = Some(params);
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, PROBLEM_INTERNAL, "internal server error")
            .with_detail(message)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, PROBLEM_NOT_FOUND, "resource not found")
            .with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, PROBLEM_SERVICE_UNAVAILABLE, "service unavailable")
            .with_detail(detail)
    }

    pub(crate) fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, PROBLEM_BAD_GATEWAY, "upstream error").with_detail(detail)
    }

    pub(crate) fn gateway_timeout(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, PROBLEM_GATEWAY_TIMEOUT, "operation timed out")
            .with_detail(detail)
    }
}

/// Map a core-level failure onto the status codes fixed by the
/// `ProxyError` → HTTP status table.
impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match &err {
            ProxyError::InstanceNotFound { .. } => Self::not_found(err.to_string()),
            ProxyError::InstanceDisabled { .. } => Self::conflict(err.to_string()),
            ProxyError::DecryptionError { .. } => Self::service_unavailable(err.to_string()),
            ProxyError::Unreachable { .. } => Self::service_unavailable(err.to_string()),
            ProxyError::SessionLost { .. } => Self::bad_gateway(err.to_string()),
            ProxyError::UpstreamError { .. } => Self::bad_gateway(err.to_string()),
            ProxyError::ValidationError { .. } => Self::bad_request(err.to_string()),
            ProxyError::Cancelled => Self::gateway_timeout(err.to_string()),
            ProxyError::Unavailable { .. } => Self::service_unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_not_found_maps_to_404() {
        let err = ApiError::from(ProxyError::InstanceNotFound { instance_id: 1 });
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn instance_disabled_maps_to_409() {
        let err = ApiError::from(ProxyError::InstanceDisabled { instance_id: 1 });
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn decryption_error_maps_to_503() {
        let err = ApiError::from(ProxyError::DecryptionError { instance_id: 1 });
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn session_lost_maps_to_502() {
        let err = ApiError::from(ProxyError::SessionLost { instance_id: 1 });
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn validation_error_maps_to_400() {
        let err = ApiError::from(ProxyError::ValidationError { field: "hash", why: "empty".into() });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn cancelled_maps_to_504() {
        let err = ApiError::from(ProxyError::Cancelled);
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let err = ApiError::from(ProxyError::Unavailable { instance_id: 1 });
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
