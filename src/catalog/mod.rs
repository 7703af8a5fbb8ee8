//! Каталог: залы, места и сеансы. Ядро только читает его, наполняет
//! каталог внешний сервис управления.

use async_trait::async_trait;

use crate::error::{BookingError, StoreError};
use crate::models::{Seat, Showing, ShowingId, Theater, TheaterId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

#[async_trait]
pub trait SeatCatalog: Send + Sync {
    async fn theater(&self, theater_id: TheaterId) -> Result<Option<Theater>, StoreError>;

    /// Места зала в порядке ряд → номер. Пустой список, если зала нет.
    async fn seats_for_theater(&self, theater_id: TheaterId) -> Result<Vec<Seat>, StoreError>;

    async fn showing(&self, showing_id: ShowingId) -> Result<Option<Showing>, StoreError>;

    /// `listSeats`: упорядоченные места зала, `not_found` если зала нет.
    async fn list_seats(&self, theater_id: TheaterId) -> Result<Vec<Seat>, BookingError> {
        if self.theater(theater_id).await?.is_none() {
            return Err(BookingError::NotFound { entity: "theater", id: theater_id });
        }
        Ok(self.seats_for_theater(theater_id).await?)
    }
}
