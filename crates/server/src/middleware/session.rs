use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use deployment::Deployment;
use feedback_protocol::UserInfo;

use crate::{
    DeploymentImpl,
    error::ApiError,
    http::auth::{extract_query_param, is_stream_endpoint},
};

/// The authenticated caller, inserted as a request extension by
/// [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub user: UserInfo,
    pub token: String,
}

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let (prefix, rest) = trimmed.split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn extract_session_token(req: &Request) -> Option<String> {
    if let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
    {
        return Some(value.to_string());
    }

    if is_stream_endpoint(req) {
        return extract_query_param(req, "token");
    }

    None
}

pub async fn require_session(
    State(deployment): State<DeploymentImpl>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_session_token(&req) else {
        return ApiError::Unauthorized.into_response();
    };

    match deployment.auth().current_user(&token).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentSession { user, token });
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(path = %req.uri().path(), error = %err, "session rejected");
            ApiError::from(err).into_response()
        }
    }
}
