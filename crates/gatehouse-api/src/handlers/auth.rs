// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Token handlers.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;

use crate::auth::TokenKind;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ClientIp, Identity, ValidatedJson};
use crate::response::{AuthResponse, MeResponse, RefreshRequest};
use crate::state::AppState;

// =============================================================================
// Refresh
// =============================================================================

/// POST {base}/auth/refresh
///
/// Exchanges a refresh token for a new token pair. Extra claims such as the
/// role carry over to the new tokens.
pub async fn refresh(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let tokens = state.tokens();
    let claims = tokens.validate(&request.refresh_token).map_err(|e| {
        tracing::debug!(reason = e.reason(), client_ip = ?client_ip, "Refresh token rejected");
        ApiError::unauthenticated(format!("invalid refresh token: {}", e))
    })?;

    if claims.kind != TokenKind::Refresh {
        return Err(ApiError::unauthenticated("not a refresh token"));
    }

    let now = Utc::now();
    let access = tokens.issue_at(
        TokenKind::Access,
        claims.uid,
        &claims.sub,
        claims.extra.clone(),
        now,
    )?;
    let refresh = tokens.issue_at(TokenKind::Refresh, claims.uid, &claims.sub, claims.extra, now)?;

    tracing::info!(user_id = %claims.uid, "Token pair refreshed");

    Ok(Json(AuthResponse::bearer(
        access,
        refresh,
        tokens.access_ttl().as_secs(),
    )))
}

// =============================================================================
// Current User
// =============================================================================

/// GET {base}/auth/me
///
/// Returns the caller and the remaining lifetime of the presented token.
pub async fn me(State(state): State<AppState>, Identity(ctx): Identity) -> impl IntoResponse {
    let remaining = (ctx.expires_at - Utc::now()).to_std().unwrap_or_default();

    Json(MeResponse {
        user_id: ctx.user_id,
        username: ctx.username,
        role: ctx.role,
        permissions: ctx
            .permissions
            .as_deref()
            .cloned()
            .unwrap_or_default(),
        expires_at: ctx.expires_at,
        remaining_secs: remaining.as_secs(),
        expiring_soon: remaining < state.tokens().refresh_threshold(),
    })
}
