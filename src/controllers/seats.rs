use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::middleware::{AuthUser, JsonBody};
use crate::models::{SeatId, ShowingId, TheaterId};
use crate::services::ReleaseOutcome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showings/{showing_id}/seats", get(get_seat_map))
        .route("/seats/lock", patch(toggle_seat_lock))
        .route("/theaters/{theater_id}/seats", get(list_theater_seats))
}

/* ---------- SEAT MAP ---------- */

// GET /api/showings/{showing_id}/seats
async fn get_seat_map(
    State(state): State<Arc<AppState>>,
    Path(showing_id): Path<ShowingId>,
    user: Option<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let map = state
        .seat_maps
        .seat_map(showing_id, user.map(|u| u.user_id))
        .await?;
    Ok(Json(map))
}

// GET /api/theaters/{theater_id}/seats
async fn list_theater_seats(
    State(state): State<Arc<AppState>>,
    Path(theater_id): Path<TheaterId>,
) -> ApiResult<impl IntoResponse> {
    let seats = state.catalog.list_seats(theater_id).await?;
    Ok(Json(seats))
}

/* ---------- LOCKS ---------- */

// PATCH /api/seats/lock
#[derive(Debug, Deserialize)]
struct SeatLockRequest {
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    pub lock: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum SeatLockStatus {
    Granted,
    Released,
    NotFound,
}

#[derive(Debug, Serialize)]
struct SeatLockResponse {
    pub status: SeatLockStatus,
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshed: bool,
}

async fn toggle_seat_lock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(req): JsonBody<SeatLockRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = if req.lock {
        let grant = state.locks.acquire(req.showing_id, req.seat_id, user.user_id).await?;
        SeatLockResponse {
            status: SeatLockStatus::Granted,
            showing_id: req.showing_id,
            seat_id: req.seat_id,
            expires_at: Some(grant.lock.expires_at),
            refreshed: grant.refreshed,
        }
    } else {
        let status = match state.locks.release(req.showing_id, req.seat_id, user.user_id).await? {
            ReleaseOutcome::Released => SeatLockStatus::Released,
            ReleaseOutcome::NotFound => SeatLockStatus::NotFound,
        };
        SeatLockResponse {
            status,
            showing_id: req.showing_id,
            seat_id: req.seat_id,
            expires_at: None,
            refreshed: false,
        }
    };

    Ok(Json(response))
}
