use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::SeatCatalog;
use crate::error::StoreError;
use crate::models::{Seat, SeatClass, Showing, ShowingId, Theater, TheaterId};

/// Каталог в памяти: для тестов и для запуска без Postgres.
#[derive(Default)]
pub struct MemoryCatalog {
    theaters: RwLock<HashMap<TheaterId, Theater>>,
    seats: RwLock<HashMap<TheaterId, Vec<Seat>>>,
    showings: RwLock<HashMap<ShowingId, Showing>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_theater(&self, theater: Theater) {
        self.theaters.write().await.insert(theater.id, theater);
    }

    pub async fn insert_seats(&self, theater_id: TheaterId, seats: Vec<Seat>) {
        let mut all = self.seats.write().await;
        let entry = all.entry(theater_id).or_default();
        entry.extend(seats);
        entry.sort_by(Seat::display_order);
    }

    pub async fn insert_showing(&self, showing: Showing) {
        self.showings.write().await.insert(showing.id, showing);
    }

    /// Заводит зал с рядами A.. и местами 1..=seats_per_row (A1, A2, ...).
    /// Последний ряд помечается как premium.
    pub async fn seed_theater(
        &self,
        name: &str,
        location: &str,
        rows: u8,
        seats_per_row: i32,
    ) -> (Theater, Vec<Seat>) {
        let theater = Theater {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: location.to_string(),
            city: None,
            created_at: Utc::now(),
        };

        let rows = rows.min(26);
        let mut seats = Vec::with_capacity(rows as usize * seats_per_row.max(0) as usize);
        for r in 0..rows {
            let row_label = char::from(b'A' + r).to_string();
            let seat_class = if r + 1 == rows && rows > 1 {
                SeatClass::Premium
            } else {
                SeatClass::Regular
            };
            for column_number in 1..=seats_per_row {
                seats.push(Seat {
                    id: Uuid::new_v4(),
                    theater_id: theater.id,
                    seat_number: format!("{row_label}{column_number}"),
                    row_label: row_label.clone(),
                    column_number,
                    seat_class,
                });
            }
        }

        self.insert_theater(theater.clone()).await;
        self.insert_seats(theater.id, seats.clone()).await;
        (theater, seats)
    }

    /// Заводит активный сеанс в зале, начинающийся в `starts_at`.
    pub async fn seed_showing(
        &self,
        theater_id: TheaterId,
        starts_at: DateTime<Utc>,
        duration: Duration,
    ) -> Showing {
        let showing = Showing {
            id: Uuid::new_v4(),
            theater_id,
            movie_id: Uuid::new_v4(),
            starts_at,
            ends_at: starts_at + duration,
            expires_at: None,
            is_active: true,
        };
        self.insert_showing(showing.clone()).await;
        showing
    }
}

#[async_trait]
impl SeatCatalog for MemoryCatalog {
    async fn theater(&self, theater_id: TheaterId) -> Result<Option<Theater>, StoreError> {
        Ok(self.theaters.read().await.get(&theater_id).cloned())
    }

    async fn seats_for_theater(&self, theater_id: TheaterId) -> Result<Vec<Seat>, StoreError> {
        Ok(self.seats.read().await.get(&theater_id).cloned().unwrap_or_default())
    }

    async fn showing(&self, showing_id: ShowingId) -> Result<Option<Showing>, StoreError> {
        Ok(self.showings.read().await.get(&showing_id).cloned())
    }
}
