//! Mapping of core errors onto HTTP responses

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use courier_common::Error;
use serde_json::json;
use tracing::{error, warn};

/// Error returned by every handler. Rendered as `{"errors": ["..."]}`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message shown to the caller
    pub fn message(&self) -> String {
        match &self.0 {
            Error::Validation(m)
            | Error::NotFound(m)
            | Error::Permissions(m)
            | Error::Auth(m)
            | Error::Persistence(m)
            | Error::Directory(m)
            | Error::Unknown(m) => m.clone(),
            Error::DefaultScope(_) => self.0.to_string(),
            Error::Config(_) | Error::Other(_) => "An unexpected error occurred".to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(format!(
            "Request body could not be parsed: {}",
            rejection.body_text()
        )))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "errors": [self.message()] }))).into_response()
    }
}

/// Unwrap a JSON body, turning parse failures into validation errors
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_and_message() {
        let err = ApiError(Error::DefaultScope("openid".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.message(),
            "You cannot send a notification to a default scope: openid"
        );

        let err = ApiError(Error::NotFound("Campaign missing".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Campaign missing");

        let err = ApiError(Error::Config("secret".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "An unexpected error occurred");
    }
}
