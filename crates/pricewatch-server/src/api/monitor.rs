use axum::{
    extract::{Path, State},
    Extension, Json,
};
use pricewatch_engine::{EngineError, MonitorReport};

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ResponseMeta};

/// Runs an immediate check of one item on every registered marketplace.
pub(super) async fn monitor_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(item_id): Path<i64>,
) -> Result<Json<ApiResponse<MonitorReport>>, ApiError> {
    let report = state
        .monitor
        .monitor_item(item_id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::ItemNotFound(_) => ApiError::new(request_id, "not_found", error.to_string()),
        _ => {
            tracing::error!(error = %error, "manual monitor failed");
            ApiError::new(request_id, "internal_error", "monitor request failed")
        }
    }
}
