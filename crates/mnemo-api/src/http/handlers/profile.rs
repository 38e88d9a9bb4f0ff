//! Memory profile HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/profile         - Get the user's memory profile (or null)
//! - POST /api/v1/profile/refresh - Rebuild the profile from unprocessed messages
//!
//! Refresh runs synchronously: unlike the per-message background update,
//! pipeline errors here surface to the caller.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use uuid::Uuid;

use mnemo_types::memory::{ProfileRebuild, UserMemoryProfile};

use crate::http::error::AppError;
use crate::http::extractors::auth::UserIdentity;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/profile - Get the user's memory profile.
///
/// Returns `data: null` when no profile exists yet (nothing is created
/// by reading).
pub async fn get_profile(
    State(state): State<AppState>,
    user: UserIdentity,
) -> Result<Json<ApiResponse<UserMemoryProfile>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let profile = state.memory_service.get(&user.0).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::nullable(profile, request_id, elapsed)))
}

/// POST /api/v1/profile/refresh - Rebuild the profile from all
/// unprocessed messages.
pub async fn refresh_profile(
    State(state): State<AppState>,
    user: UserIdentity,
) -> Result<Json<ApiResponse<ProfileRebuild>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let rebuild = state
        .memory_service
        .rebuild_profile(&state.provider, &user.0)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(rebuild, request_id, elapsed)))
}
