use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{delete, get, put},
};
use deployment::Deployment;
use feedback_protocol::{ApiResponse, ClassifyFeedback, FeedbackItem};
use serde::Deserialize;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, http::auth::require_workflow_token};

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<u64>,
}

/// Endpoints for the external classification workflow.
pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/feedback/pending", get(list_pending))
        .route("/feedback/{id}/classification", put(classify))
        .route("/feedback/{id}", delete(delete_feedback))
        .route_layer(from_fn_with_state(
            deployment.clone(),
            require_workflow_token,
        ))
}

async fn list_pending(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<PendingQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<FeedbackItem>>>, ApiError> {
    let items = deployment.feedback().list_pending(query.limit).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

async fn classify(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClassifyFeedback>,
) -> Result<ResponseJson<ApiResponse<FeedbackItem>>, ApiError> {
    if !payload.status.is_known()
        || payload.category.is_some_and(|c| !c.is_known())
        || payload.priority.is_some_and(|p| !p.is_known())
    {
        return Err(ApiError::BadRequest(
            "Unrecognised status, category or priority".to_string(),
        ));
    }

    let item = deployment.feedback().classify(id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

async fn delete_feedback(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment.feedback().delete(id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}
