use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::catalog::SeatCatalog;
use crate::error::StoreError;
use crate::models::{Seat, Showing, ShowingId, Theater, TheaterId};

fn seats_key(theater_id: TheaterId) -> String {
    format!("catalog:seats:{theater_id}")
}

fn theater_key(theater_id: TheaterId) -> String {
    format!("catalog:theater:{theater_id}")
}

#[async_trait]
impl SeatCatalog for CacheService {
    async fn theater(&self, theater_id: TheaterId) -> Result<Option<Theater>, StoreError> {
        let key = theater_key(theater_id);
        if let Some(theater) = self.read_cached::<Theater>(&key).await {
            return Ok(Some(theater));
        }

        let theater = self.inner.theater(theater_id).await?;
        if let Some(theater) = &theater {
            self.write_cached(&key, theater).await;
        }
        Ok(theater)
    }

    async fn seats_for_theater(&self, theater_id: TheaterId) -> Result<Vec<Seat>, StoreError> {
        let key = seats_key(theater_id);
        if let Some(seats) = self.read_cached::<Vec<Seat>>(&key).await {
            return Ok(seats);
        }

        let seats = self.inner.seats_for_theater(theater_id).await?;
        // Пустой список не кешируем: зал могут наполнить позже.
        if !seats.is_empty() {
            self.write_cached(&key, &seats).await;
        }
        Ok(seats)
    }

    async fn showing(&self, showing_id: ShowingId) -> Result<Option<Showing>, StoreError> {
        self.inner.showing(showing_id).await
    }
}

impl CacheService {
    // === Работа с кешем ===
    // Сбои Redis не ошибка: идём во внутренний каталог.

    async fn read_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = match conn.get(key).await {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "catalog cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&data?) {
            Ok(value) => {
                debug!(key, "catalog cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "catalog cache entry is corrupt");
                None
            }
        }
    }

    async fn write_cached<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "catalog cache serialize failed");
                return;
            }
        };

        let mut conn = self.redis.conn.clone();
        let written: redis::RedisResult<()> = conn.set_ex(key, data, self.ttl_secs).await;
        if let Err(e) = written {
            warn!(key, error = %e, "catalog cache write failed");
        }
    }
}
