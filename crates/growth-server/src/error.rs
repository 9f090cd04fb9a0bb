//! HTTP error responses

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use growth_lib::{ModelError, PredictionError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// An error reported to API clients as `{"error": kind, "message": text}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_input",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        let kind = err.kind();
        match err {
            PredictionError::ModelUnavailable(e) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                kind,
                message: e.to_string(),
            },
            PredictionError::InvalidInput(reason) => Self {
                status: StatusCode::BAD_REQUEST,
                kind,
                message: reason,
            },
            // Details are logged by the prediction service
            PredictionError::Inference(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind,
                message: "Prediction failed".to_string(),
            },
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        PredictionError::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growth_lib::ArtifactError;

    #[test]
    fn test_status_mapping() {
        let artifact = ArtifactError::unavailable("m", "HTTP 429");
        let unavailable: ApiError = PredictionError::from(ModelError::from(artifact)).into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.kind(), "model_unavailable");

        let invalid: ApiError = PredictionError::InvalidInput("empty batch".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let failed: ApiError =
            PredictionError::Inference("shape mismatch at node 12".into()).into();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!failed.message.contains("node 12"));
    }

    #[test]
    fn test_corrupt_model_is_unavailable() {
        let err: ApiError = ModelError::Corrupt {
            path: "/tmp/model.onnx".into(),
            reason: "bad magic".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
