#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use showtime_booking::catalog::MemoryCatalog;
use showtime_booking::clock::{Clock, ManualClock};
use showtime_booking::config::Config;
use showtime_booking::models::{Seat, SeatId, Showing, Theater, UserId};
use showtime_booking::AppState;

pub const LOCK_TTL_SECS: u64 = 120;

/// Зал 3x5 (A1..C5), один сеанс через час, часы двигаются вручную.
pub struct Fixture {
    pub state: Arc<AppState>,
    pub catalog: Arc<MemoryCatalog>,
    pub clock: Arc<ManualClock>,
    pub theater: Theater,
    pub seats: Vec<Seat>,
    pub showing: Showing,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(Config::in_memory()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        config.booking.lock_ttl_secs = LOCK_TTL_SECS;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let catalog = Arc::new(MemoryCatalog::new());
        let (theater, seats) = catalog.seed_theater("Aurora", "Main st 1", 3, 5).await;
        let showing = catalog
            .seed_showing(theater.id, Utc::now() + Duration::hours(1), Duration::hours(2))
            .await;

        let state = Arc::new(AppState::in_memory(config, catalog.clone(), clock.clone()));
        Self { state, catalog, clock, theater, seats, showing }
    }

    pub fn seat(&self, number: &str) -> SeatId {
        self.seats
            .iter()
            .find(|seat| seat.seat_number == number)
            .map(|seat| seat.id)
            .unwrap_or_else(|| panic!("no seat {number}"))
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Сдвигает часы за конец сеанса.
    pub fn finish_showing(&self) {
        self.clock.set(self.showing.ends_at + Duration::seconds(1));
    }

    pub fn expire_locks(&self) {
        self.clock.advance(Duration::seconds(LOCK_TTL_SECS as i64 + 1));
    }
}

pub fn user() -> UserId {
    uuid::Uuid::new_v4()
}
