use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    AppState,
    routes::alert::model::AlertEvent,
    routes::crossing::model::EncounterHistory,
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

// 两个清理任务各自独立、幂等，批量没清完下一轮接着清

pub async fn cleanup_expired_crossed_events(
    State(state): State<AppState>,
) -> Json<ApiResponse<CleanupResponse>> {
    match AlertEvent::cleanup_expired(&state.pool).await {
        Ok(deleted) => success_to_api_response(CleanupResponse { deleted }),
        Err(err) => {
            tracing::error!("Failed to clean up expired alert events: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Cleanup failed".into())
        }
    }
}

pub async fn cleanup_expired_history(
    State(state): State<AppState>,
) -> Json<ApiResponse<CleanupResponse>> {
    match EncounterHistory::cleanup_expired(&state.pool).await {
        Ok(deleted) => success_to_api_response(CleanupResponse { deleted }),
        Err(err) => {
            tracing::error!("Failed to clean up expired history: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Cleanup failed".into())
        }
    }
}
