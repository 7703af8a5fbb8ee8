use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{bookable_showing, ensure_seats_in_theater};
use crate::broadcast::Broadcaster;
use crate::catalog::SeatCatalog;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::models::{SeatId, SeatLock, ShowingId, UserId};
use crate::store::{LockAttempt, LockRequest, ReleaseAttempt, SeatLedger};

#[derive(Debug, Clone, Serialize)]
pub struct LockGrant {
    pub lock: SeatLock,
    /// Пользователь уже держал это место, продлён только срок.
    pub refreshed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    /// Блокировки не было или она истекла. Это тоже успех.
    NotFound,
}

/// Операции над блокировками мест. TTL общий для всего деплоя.
pub struct LockService {
    catalog: Arc<dyn SeatCatalog>,
    ledger: Arc<dyn SeatLedger>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LockService {
    pub fn new(
        catalog: Arc<dyn SeatCatalog>,
        ledger: Arc<dyn SeatLedger>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self { catalog, ledger, broadcaster, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn acquire(
        &self,
        showing_id: ShowingId,
        seat_id: SeatId,
        user_id: UserId,
    ) -> Result<LockGrant, BookingError> {
        let now = self.clock.now();
        let showing = bookable_showing(self.catalog.as_ref(), showing_id, now).await?;
        ensure_seats_in_theater(self.catalog.as_ref(), &showing, &[seat_id]).await?;

        let request = LockRequest { showing_id, seat_id, user_id, now, expires_at: now + self.ttl };
        match self.ledger.acquire_lock(request).await? {
            LockAttempt::Granted { lock, change } => {
                let refreshed = change.is_none();
                if let Some(change) = change {
                    info!(%showing_id, %seat_id, %user_id, expires_at = %lock.expires_at, "seat locked");
                    self.broadcaster.publish(&[change]);
                } else {
                    debug!(%showing_id, %seat_id, %user_id, "seat lock refreshed");
                }
                Ok(LockGrant { lock, refreshed })
            }
            LockAttempt::HeldByOther(holder) => {
                debug!(%showing_id, %seat_id, %user_id, holder = %holder.user_id, "lock denied: already locked");
                Err(BookingError::AlreadyLocked { seat_id })
            }
            LockAttempt::Booked => {
                debug!(%showing_id, %seat_id, %user_id, "lock denied: already booked");
                Err(BookingError::AlreadyBooked { seat_id })
            }
        }
    }

    /// Снять свою блокировку. Снимать можно и на прошедшем сеансе.
    pub async fn release(
        &self,
        showing_id: ShowingId,
        seat_id: SeatId,
        user_id: UserId,
    ) -> Result<ReleaseOutcome, BookingError> {
        let now = self.clock.now();
        match self.ledger.release_lock(showing_id, seat_id, user_id, now).await? {
            ReleaseAttempt::Released(change) => {
                info!(%showing_id, %seat_id, %user_id, "seat released");
                self.broadcaster.publish(&[change]);
                Ok(ReleaseOutcome::Released)
            }
            ReleaseAttempt::Expired(change) => {
                debug!(%showing_id, %seat_id, "expired lock dropped on release");
                self.broadcaster.publish(&[change]);
                Ok(ReleaseOutcome::NotFound)
            }
            ReleaseAttempt::Absent => Ok(ReleaseOutcome::NotFound),
            ReleaseAttempt::HeldByOther => {
                debug!(%showing_id, %seat_id, %user_id, "release denied: not owner");
                Err(BookingError::NotOwner)
            }
        }
    }

    /// Вычищает истёкшие блокировки и оповещает зрителей, что места свободны.
    pub async fn sweep_expired(&self) -> Result<usize, BookingError> {
        let now: DateTime<Utc> = self.clock.now();
        let changes = self.ledger.purge_expired_locks(now).await?;
        if !changes.is_empty() {
            info!(count = changes.len(), "expired seat locks purged");
            self.broadcaster.publish(&changes);
        }
        Ok(changes.len())
    }
}
