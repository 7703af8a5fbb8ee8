use async_trait::async_trait;

use super::SeatCatalog;
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{Seat, Showing, ShowingId, Theater, TheaterId};

#[derive(Clone)]
pub struct PgCatalog {
    db: Database,
}

impl PgCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SeatCatalog for PgCatalog {
    async fn theater(&self, theater_id: TheaterId) -> Result<Option<Theater>, StoreError> {
        let theater = sqlx::query_as::<_, Theater>(
            "SELECT id, name, location, city, created_at FROM theaters WHERE id = $1",
        )
        .bind(theater_id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(theater)
    }

    async fn seats_for_theater(&self, theater_id: TheaterId) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT id, theater_id, seat_number, row_label, column_number, seat_class
             FROM seats
             WHERE theater_id = $1
             ORDER BY row_label, column_number, id",
        )
        .bind(theater_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(seats)
    }

    async fn showing(&self, showing_id: ShowingId) -> Result<Option<Showing>, StoreError> {
        let showing = sqlx::query_as::<_, Showing>(
            "SELECT id, theater_id, movie_id, starts_at, ends_at, expires_at, is_active
             FROM showings
             WHERE id = $1",
        )
        .bind(showing_id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(showing)
    }
}
