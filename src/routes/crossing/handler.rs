use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{CrossPathHistoryItem, CrossedPair, CrossedPathItem, EncounterHistory, UnlockStatus};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PairQuery {
    pub user_a: String,
    pub user_b: String,
}

pub async fn get_crossed_paths(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<ApiResponse<Vec<CrossedPathItem>>> {
    match CrossedPair::list_for_user(&state.pool, &query.user_id, query.limit).await {
        Ok(items) => success_to_api_response(items),
        Err(err) => {
            tracing::error!("Failed to list crossed paths: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to list crossed paths".into())
        }
    }
}

pub async fn get_crossed_paths_count(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<ApiResponse<i64>> {
    match CrossedPair::count_for_user(&state.pool, &query.user_id).await {
        Ok(count) => success_to_api_response(count),
        Err(err) => {
            tracing::error!("Failed to count crossed paths: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to count crossed paths".into())
        }
    }
}

pub async fn check_crossed_paths_unlock(
    State(state): State<AppState>,
    Query(query): Query<PairQuery>,
) -> Json<ApiResponse<UnlockStatus>> {
    match CrossedPair::unlock_status(&state.pool, &query.user_a, &query.user_b).await {
        Ok(status) => success_to_api_response(status),
        Err(err) => {
            tracing::error!("Failed to check unlock status: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to check unlock status".into())
        }
    }
}

pub async fn get_cross_path_history(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Json<ApiResponse<Vec<CrossPathHistoryItem>>> {
    match EncounterHistory::list_for_user(&state.pool, &query.user_id).await {
        Ok(items) => success_to_api_response(items),
        Err(err) => {
            tracing::error!("Failed to load cross path history: {:?}", err);
            error_to_api_response(error_codes::INTERNAL_ERROR, "Failed to load history".into())
        }
    }
}
