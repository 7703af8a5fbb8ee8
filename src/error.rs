use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{SeatId, ShowingId};

/// Сбой хранилища или кеша. Наружу всегда уходит как `storage_unavailable`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Booked,
    Locked,
}

/// Место, которое не удалось забрать при оформлении брони.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatConflict {
    pub seat_id: SeatId,
    pub reason: ConflictReason,
}

/// Результат операций ядра, который видит вызывающая сторона.
/// Всё, кроме `StorageUnavailable`, окончательный ответ: повторять тот же
/// запрос бессмысленно, клиент должен перечитать схему зала.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: uuid::Uuid },

    #[error("seat {seat_id} is locked by another user")]
    AlreadyLocked { seat_id: SeatId },

    #[error("seat {seat_id} is already booked")]
    AlreadyBooked { seat_id: SeatId },

    #[error("{} seat(s) can no longer be claimed", seats.len())]
    SeatConflict { seats: Vec<SeatConflict> },

    #[error("showing {showing_id} is not available for booking")]
    ShowingUnavailable { showing_id: ShowingId },

    #[error("operation is only allowed for the owner")]
    NotOwner,

    #[error("seat(s) do not belong to the showing's theater")]
    InvalidSeat { seat_ids: Vec<SeatId> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound { .. } => "not_found",
            BookingError::AlreadyLocked { .. } => "already_locked",
            BookingError::AlreadyBooked { .. } => "already_booked",
            BookingError::SeatConflict { .. } => "seat_conflict",
            BookingError::ShowingUnavailable { .. } => "showing_unavailable",
            BookingError::NotOwner => "not_owner",
            BookingError::InvalidSeat { .. } => "invalid_seat",
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Повтор имеет смысл только при сбое хранилища.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StorageUnavailable(_))
    }

    /// Места, которые клиенту нужно снять с выбора.
    pub fn failed_seats(&self) -> Vec<SeatId> {
        match self {
            BookingError::AlreadyLocked { seat_id } | BookingError::AlreadyBooked { seat_id } => {
                vec![*seat_id]
            }
            BookingError::SeatConflict { seats } => seats.iter().map(|c| c.seat_id).collect(),
            BookingError::InvalidSeat { seat_ids } => seat_ids.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "storage operation failed");
        BookingError::StorageUnavailable(err.to_string())
    }
}

/// Ошибка HTTP-слоя.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

const RETRY_AFTER_SECS: &str = "1";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Booking(err) => err,
            ApiError::Unauthorized => {
                let body = json!({
                    "error": "unauthorized",
                    "message": "a verified user id is required",
                    "retryable": false,
                });
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            ApiError::BadRequest(msg) => BookingError::InvalidRequest(msg),
        };

        let status = match &err {
            BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BookingError::AlreadyLocked { .. }
            | BookingError::AlreadyBooked { .. }
            | BookingError::SeatConflict { .. } => StatusCode::CONFLICT,
            BookingError::ShowingUnavailable { .. }
            | BookingError::InvalidSeat { .. }
            | BookingError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::NotOwner => StatusCode::FORBIDDEN,
            BookingError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let mut body = json!({
            "error": err.code(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        });
        match &err {
            BookingError::SeatConflict { seats } => body["seats"] = json!(seats),
            _ => {
                let failed = err.failed_seats();
                if !failed.is_empty() {
                    body["seats"] = json!(failed);
                }
            }
        }

        let mut response = (status, Json(body)).into_response();
        if err.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn only_storage_failures_are_retryable() {
        assert!(BookingError::StorageUnavailable("timeout".into()).is_retryable());
        assert!(!BookingError::NotOwner.is_retryable());
        assert!(!BookingError::AlreadyLocked { seat_id: Uuid::new_v4() }.is_retryable());
    }

    #[test]
    fn conflict_names_every_failed_seat() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = BookingError::SeatConflict {
            seats: vec![
                SeatConflict { seat_id: a, reason: ConflictReason::Booked },
                SeatConflict { seat_id: b, reason: ConflictReason::Locked },
            ],
        };
        assert_eq!(err.code(), "seat_conflict");
        assert_eq!(err.failed_seats(), vec![a, b]);
    }

    #[test]
    fn storage_error_response_carries_retry_after() {
        let response = ApiError::from(BookingError::StorageUnavailable("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }
}
