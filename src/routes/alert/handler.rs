use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;

use crate::{
    AppState,
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{self, DetectResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[axum::debug_handler]
pub async fn detect_crossed_users(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Json<ApiResponse<DetectResponse>> {
    match model::detect_crossed_users(&state.pool, &req.user_id, req.latitude, req.longitude).await
    {
        Ok(resp) => success_to_api_response(resp),
        Err(err) => {
            tracing::error!("Failed to run proximity alert detection: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to run detection".into())
        }
    }
}
