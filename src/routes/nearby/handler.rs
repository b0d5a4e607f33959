use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{self, NearbyUserMarker};

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub user_id: String,
}

#[axum::debug_handler]
pub async fn get_nearby_users(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Json<ApiResponse<Vec<NearbyUserMarker>>> {
    match model::get_nearby_users(&state.pool, &state.redis, &query.user_id).await {
        Ok(Some(markers)) => success_to_api_response(markers),
        Ok(None) => error_to_api_response(error_codes::NOT_FOUND, "User not found".into()),
        Err(err) => {
            tracing::error!("Failed to load nearby users: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to load nearby users".into())
        }
    }
}
