use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::models::event::{ProviderEvent, TrackerEvent};
use crate::services::reconcile_service::{self, IngestOutcome};
use crate::AppState;

/// POST /webhooks/tracker - batch of first-party open/click callbacks.
pub async fn tracker_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<TrackerEvent>>,
) -> (StatusCode, Json<Value>) {
    respond(reconcile_service::ingest_tracker_events(&state, events).await)
}

/// POST /webhooks/sendgrid - batch of delivery-provider event records.
pub async fn provider_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<ProviderEvent>>,
) -> (StatusCode, Json<Value>) {
    respond(reconcile_service::ingest_provider_events(&state, events).await)
}

/// 200 only for a clean batch. A 500 asks the sender to redeliver the whole
/// batch even though the valid records were already applied.
fn respond(outcome: IngestOutcome) -> (StatusCode, Json<Value>) {
    if outcome.errors.is_empty() {
        (
            StatusCode::OK,
            Json(json!({
                "message": "ok",
                "processed": outcome.applied,
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "message": "event batch processed with errors",
                "processed": outcome.applied,
                "details": outcome.errors,
            })),
        )
    }
}
