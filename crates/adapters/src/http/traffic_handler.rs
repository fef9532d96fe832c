use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::proto::Envelope;
use super::state::AppState;

/// `GET /api/traffic` — filtered per-peer statistics with the policy
/// decision attached.
pub async fn get_traffic(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    match state.policy.traffic_stats() {
        Ok(stats) => Envelope::success(stats),
        Err(err) => Envelope::from_error(&err),
    }
}
