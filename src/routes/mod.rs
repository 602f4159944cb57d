use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod dispatch;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/tasks/send-scheduled", post(dispatch::send_scheduled))
        .route("/webhooks/tracker", post(webhooks::tracker_events))
        .route("/webhooks/sendgrid", post(webhooks::provider_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
