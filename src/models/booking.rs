use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{SeatId, ShowingId, UserId};

pub type BookingId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    /// Место занимают только подтверждённые брони.
    pub fn occupies_seats(self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub booking_number: String,
    pub user_id: UserId,
    pub showing_id: ShowingId,
    pub total_price: f64,
    pub status: BookingStatus,
    pub seat_ids: Vec<SeatId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
