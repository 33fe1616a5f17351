use std::convert::Infallible;

use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::{
        Json as ResponseJson,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use deployment::Deployment;
use feedback_protocol::{ApiResponse, ChangeEvent, CreateFeedback, FeedbackItem};
use futures::{Stream, StreamExt};

use crate::{
    DeploymentImpl,
    error::ApiError,
    middleware::{CurrentSession, require_session},
};

pub const CHANGE_EVENT_NAME: &str = "change";

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/feedback", get(list_feedback).post(create_feedback))
        .route("/feedback/stream", get(stream_feedback))
        .route_layer(from_fn_with_state(deployment.clone(), require_session))
}

/// The caller's rows, newest first.
async fn list_feedback(
    State(deployment): State<DeploymentImpl>,
    Extension(session): Extension<CurrentSession>,
) -> Result<ResponseJson<ApiResponse<Vec<FeedbackItem>>>, ApiError> {
    let items = deployment.feedback().list_for_owner(session.user.id).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

/// Owner comes from the session; the body only supplies title and description.
async fn create_feedback(
    State(deployment): State<DeploymentImpl>,
    Extension(session): Extension<CurrentSession>,
    Json(payload): Json<CreateFeedback>,
) -> Result<ResponseJson<ApiResponse<FeedbackItem>>, ApiError> {
    let item = deployment
        .feedback()
        .create(session.user.id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

fn change_to_sse(event: ChangeEvent) -> Event {
    match Event::default().event(CHANGE_EVENT_NAME).json_data(&event) {
        Ok(sse) => sse,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode change event");
            Event::default().comment("encode-error")
        }
    }
}

async fn stream_feedback(
    State(deployment): State<DeploymentImpl>,
    Extension(session): Extension<CurrentSession>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let owner_id = session.user.id;
    tracing::debug!(%owner_id, "change stream opened");

    let stream = deployment
        .events()
        .subscribe(owner_id)
        .map(|event| Ok::<_, Infallible>(change_to_sse(event)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
