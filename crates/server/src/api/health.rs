use crate::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Liveness plus a snapshot of the shared browser.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let status = state.printer.engine().status();
    Json(json!({
        "status": "ok",
        "engine": {
            "phase": format!("{:?}", status.phase).to_lowercase(),
            "consumers": status.consumers,
            "launches": status.launches,
        },
    }))
}
