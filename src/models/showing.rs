use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TheaterId;

pub type ShowingId = Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Showing {
    pub id: ShowingId,
    pub theater_id: TheaterId,
    pub movie_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Showing {
    /// Сеанс можно бронировать, пока он активен и не закончился.
    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && now < self.ends_at
            && self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}
