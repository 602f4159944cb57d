use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::services::dispatch_service;
use crate::AppState;

/// POST /tasks/send-scheduled - one pass over every due email. The body is
/// ignored; the time trigger carries nothing we need. Any per-email failure
/// turns the whole response into a 500 so the trigger retries, but the
/// emails that did send stay sent.
pub async fn send_scheduled(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let stats = match dispatch_service::run_pass(&state).await {
        Ok(stats) => stats,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "dispatch pass aborted",
                    "details": [format!("{e:#}")],
                })),
            )
        }
    };

    let body = json!({
        "message": if stats.failed == 0 { "ok" } else { "dispatch pass finished with failures" },
        "attempted": stats.attempted,
        "sent": stats.sent,
        "failed": stats.failed,
    });
    let code = if stats.failed == 0 {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(body))
}
