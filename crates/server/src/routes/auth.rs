use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use deployment::Deployment;
use feedback_protocol::{ApiResponse, Credentials, SessionInfo, UserInfo};

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::{CurrentSession, require_session},
};

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let session_routes = Router::new()
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/user", get(current_user))
        .route_layer(from_fn_with_state(deployment.clone(), require_session));

    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .merge(session_routes)
}

async fn sign_up(
    State(deployment): State<DeploymentImpl>,
    Json(credentials): Json<Credentials>,
) -> Result<ResponseJson<ApiResponse<UserInfo>>, ApiError> {
    let user = deployment.auth().sign_up(&credentials).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

async fn sign_in(
    State(deployment): State<DeploymentImpl>,
    Json(credentials): Json<Credentials>,
) -> Result<ResponseJson<ApiResponse<SessionInfo>>, ApiError> {
    let session = deployment.auth().sign_in(&credentials).await?;
    Ok(ResponseJson(ApiResponse::success(session)))
}

async fn sign_out(
    State(deployment): State<DeploymentImpl>,
    Extension(session): Extension<CurrentSession>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.auth().sign_out(&session.token).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

async fn current_user(
    Extension(session): Extension<CurrentSession>,
) -> ResponseJson<ApiResponse<UserInfo>> {
    ResponseJson(ApiResponse::success(session.user))
}
