use axum::{extract::State, Extension, Json};
use pricewatch_engine::CircuitSnapshot;
use pricewatch_store::LaneLengths;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct QueueStatus {
    lanes: LaneLengths,
    circuit: CircuitSnapshot,
}

pub(super) async fn queue_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<QueueStatus>>, ApiError> {
    let lanes = state.queue.lengths().await.map_err(|e| {
        tracing::error!(error = %e, "queue status: store read failed");
        ApiError::new(req_id.0.clone(), "unavailable", "queue store unavailable")
    })?;

    Ok(Json(ApiResponse {
        data: QueueStatus {
            lanes,
            circuit: state.circuit.snapshot(),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
