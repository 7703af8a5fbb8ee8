use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{SeatId, ShowingId, UserId};

/// Мягкий резерв места на сеанс. Не является бронью, но блокирует
/// место для всех, кроме владельца, пока не истёк.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SeatLock {
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    pub user_id: UserId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatLock {
    /// Истёкшая блокировка считается отсутствующей, даже если её ещё не вычистили.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
