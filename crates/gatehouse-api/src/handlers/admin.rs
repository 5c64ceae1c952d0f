// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Administration handlers.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::auth::UserId;
use crate::error::{ApiError, ApiResult};
use crate::extractors::Identity;
use crate::response::{InvalidateResponse, StatsResponse};
use crate::state::AppState;

/// POST {base}/admin/rbac/{user_id}/invalidate
///
/// Drops the cached roles and permissions of a user.
pub async fn invalidate_rbac(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid user id: {}", user_id)))?;

    let invalidated = state.rbac().invalidate(user_id);
    tracing::info!(
        user_id = %user_id,
        by = %caller.user_id,
        invalidated,
        "RBAC entry invalidation requested"
    );

    Ok(Json(InvalidateResponse {
        user_id,
        invalidated,
    }))
}

/// GET {base}/admin/stats
///
/// Reports cache and rate limiter occupancy.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        rbac: state.rbac().stats(),
        rate_limit_buckets: state.limiter.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
