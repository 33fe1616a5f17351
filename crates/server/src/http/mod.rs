use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::{DeploymentImpl, routes};

pub(crate) mod auth;

pub fn router(deployment: DeploymentImpl) -> Router {
    let client_routes = Router::new()
        .merge(routes::auth::router(&deployment))
        .merge(routes::feedback::router(&deployment))
        .layer(from_fn_with_state(deployment.clone(), auth::require_api_key));

    let api_routes = Router::new()
        .merge(client_routes)
        .nest("/workflow", routes::workflow::router(&deployment));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
