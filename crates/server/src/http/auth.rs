use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use deployment::Deployment;
use services::services::config::AccessControlMode;
use url::form_urlencoded;

use crate::{DeploymentImpl, error::ApiError};

pub const API_KEY_HEADER: &str = "x-api-token";
pub const WORKFLOW_TOKEN_HEADER: &str = "x-workflow-token";
const API_KEY_QUERY: &str = "apikey";

pub(crate) fn extract_query_param(req: &Request, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key == name {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            return Some(trimmed.to_string());
        }
    }
    None
}

/// EventSource clients cannot set headers, so the stream endpoint also accepts
/// credentials in the query string.
pub(crate) fn is_stream_endpoint(req: &Request) -> bool {
    req.uri().path().ends_with("/stream")
}

fn peer_is_loopback(req: &Request) -> Option<bool> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip().is_loopback())
}

fn peer_label(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn extract_api_key(req: &Request) -> Option<String> {
    if let Some(value) = header_value(req, API_KEY_HEADER) {
        return Some(value);
    }

    if is_stream_endpoint(req) {
        return extract_query_param(req, API_KEY_QUERY);
    }

    None
}

/// Project key gate for the public API. A no-op unless
/// `access_control.mode = TOKEN`.
pub async fn require_api_key(
    State(deployment): State<DeploymentImpl>,
    req: Request,
    next: Next,
) -> Response {
    let access_control = {
        let config = deployment.config().read().await;
        config.access_control.clone()
    };

    if matches!(access_control.mode, AccessControlMode::Disabled) {
        return next.run(req).await;
    }

    let Some(expected_token) = access_control.token.as_deref().filter(|t| !t.is_empty()) else {
        tracing::warn!(
            "accessControl.mode=TOKEN but accessControl.token is missing; treating as disabled"
        );
        return next.run(req).await;
    };

    let is_loopback = peer_is_loopback(&req).unwrap_or(false);
    if access_control.allow_localhost_bypass && is_loopback {
        return next.run(req).await;
    }

    let presented = extract_api_key(&req);
    if presented.as_deref() != Some(expected_token) {
        let reason = if presented.is_none() {
            "missing_token"
        } else {
            "token_mismatch"
        };

        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            peer = %peer_label(&req),
            reason,
            "Unauthorized API request"
        );

        return ApiError::Unauthorized.into_response();
    }

    next.run(req).await
}

/// Gate for the classification workflow's write-back API. With no workflow
/// token configured the API is closed.
pub async fn require_workflow_token(
    State(deployment): State<DeploymentImpl>,
    req: Request,
    next: Next,
) -> Response {
    let expected = {
        let config = deployment.config().read().await;
        config.workflow.token.clone()
    };

    let Some(expected) = expected.filter(|t| !t.is_empty()) else {
        tracing::warn!(
            path = %req.uri().path(),
            "workflow request rejected; no workflow token configured"
        );
        return ApiError::Forbidden("Workflow API is not configured".to_string())
            .into_response();
    };

    if header_value(&req, WORKFLOW_TOKEN_HEADER).as_deref() != Some(expected.as_str()) {
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            peer = %peer_label(&req),
            "Unauthorized workflow request"
        );
        return ApiError::Unauthorized.into_response();
    }

    next.run(req).await
}
