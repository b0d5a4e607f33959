use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;

use crate::{
    AppState,
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{self, PublishLocationResponse, RecordLocationResponse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[axum::debug_handler]
pub async fn record_location(
    State(state): State<AppState>,
    Json(req): Json<LocationUpdateRequest>,
) -> Json<ApiResponse<RecordLocationResponse>> {
    match model::record_location(
        &state.pool,
        &state.config,
        &state.http,
        &req.user_id,
        req.latitude,
        req.longitude,
    )
    .await
    {
        Ok(resp) => success_to_api_response(resp),
        Err(err) => {
            tracing::error!("Failed to record location: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to record location".into())
        }
    }
}

#[axum::debug_handler]
pub async fn publish_location(
    State(state): State<AppState>,
    Json(req): Json<LocationUpdateRequest>,
) -> Json<ApiResponse<PublishLocationResponse>> {
    match model::publish_location(&state.pool, &req.user_id, req.latitude, req.longitude).await {
        Ok(resp) => success_to_api_response(resp),
        Err(err) => {
            tracing::error!("Failed to publish location: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to publish location".into())
        }
    }
}
