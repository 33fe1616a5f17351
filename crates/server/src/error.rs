use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::DbErr;
use feedback_protocol::ApiResponse;
use services::services::{auth::AuthError, feedback::FeedbackError};
use thiserror::Error;

#[derive(Debug, Error, ts_rs::TS)]
#[ts(type = "string")]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Auth(err) => match err {
                AuthError::UserAlreadyRegistered | AuthError::WeakPassword => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "AuthError")
                }
                AuthError::InvalidCredentials | AuthError::InvalidEmail => {
                    (StatusCode::BAD_REQUEST, "AuthError")
                }
                AuthError::InvalidSession => (StatusCode::UNAUTHORIZED, "AuthError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "AuthError"),
            },
            ApiError::Feedback(err) => match err {
                FeedbackError::Validation(_) => (StatusCode::BAD_REQUEST, "FeedbackError"),
                FeedbackError::NotFound => (StatusCode::NOT_FOUND, "FeedbackError"),
                FeedbackError::Database(DbErr::RecordNotFound(_)) => {
                    (StatusCode::NOT_FOUND, "FeedbackError")
                }
                FeedbackError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FeedbackError"),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "ForbiddenError"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = self.status_and_type();

        // Client-facing failures carry the domain message verbatim so the
        // portal can show it as-is.
        let error_message = match &self {
            ApiError::Auth(err) if status_code.is_client_error() => err.to_string(),
            ApiError::Feedback(err) if status_code.is_client_error() => err.to_string(),
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Forbidden(msg) => msg.clone(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use feedback_protocol::SubmissionError;

    use super::*;

    async fn message_of(err: ApiError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        (status, json["message"].as_str().unwrap_or_default().to_string())
    }

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn auth_errors_keep_their_message() {
        assert_eq!(
            message_of(AuthError::UserAlreadyRegistered.into()).await,
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "User already registered".to_string()
            )
        );
        assert_eq!(
            message_of(AuthError::InvalidCredentials.into()).await,
            (
                StatusCode::BAD_REQUEST,
                "Invalid login credentials".to_string()
            )
        );
        assert_eq!(
            message_of(AuthError::InvalidSession.into()).await.0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn feedback_errors_map_to_expected_http_statuses() {
        let (status, message) = message_of(
            FeedbackError::Validation(SubmissionError::Title { len: 1 }).into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Title must be between 3 and 200 characters");

        assert_eq!(
            message_of(FeedbackError::NotFound.into()).await,
            (StatusCode::NOT_FOUND, "Feedback not found".to_string())
        );
        assert_eq!(
            message_of(FeedbackError::Database(DbErr::Custom("disk".to_string())).into())
                .await
                .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
