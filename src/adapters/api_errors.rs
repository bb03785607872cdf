use {
    crate::domain::error::{AdapterError, CoreError},
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer, not in the core.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        Self(CoreError::Adapter(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            CoreError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            // A hung verification must look retryable to the provider so
            // it redelivers; everything else adapter-side is final.
            CoreError::Adapter(AdapterError::Timeout(ms)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "verification_timeout",
                format!("receipt verification timed out after {ms}ms"),
            ),
            CoreError::Adapter(err) => {
                (StatusCode::BAD_REQUEST, "adapter_error", err.to_string())
            }
            CoreError::Store(err) => {
                tracing::error!("store error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            CoreError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
