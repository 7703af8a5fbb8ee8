use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::middleware::{AuthUser, JsonBody};
use crate::models::BookingId;
use crate::services::NewBooking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings).post(create_booking))
        .route("/bookings/cancel", patch(cancel_booking))
        .route("/bookings/{booking_id}", get(get_booking))
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(req): JsonBody<NewBooking>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.bookings.create_booking(user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let bookings = state.bookings.bookings_for_user(user.user_id).await?;
    Ok(Json(bookings))
}

// GET /api/bookings/{booking_id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<BookingId>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.bookings.booking(booking_id, user.user_id).await?;
    Ok(Json(booking))
}

// PATCH /api/bookings/cancel
#[derive(Debug, Deserialize)]
struct CancelBookingRequest {
    pub booking_id: BookingId,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(req): JsonBody<CancelBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.bookings.cancel_booking(req.booking_id, user.user_id).await?;
    Ok(Json(booking))
}
