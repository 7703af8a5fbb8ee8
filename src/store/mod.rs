//! Единый источник правды о занятости мест: и блокировки, и подтверждённые
//! брони живут в одном хранилище и проверяются одним и тем же атомарным
//! примитивом. Так сервис блокировок и движок бронирования не могут
//! разойтись во мнении, занято ли место.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::error::{SeatConflict, StoreError};
use crate::models::{
    Booking, BookingId, SeatChange, SeatClaim, SeatId, SeatLock, ShowingId, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

#[derive(Debug, Clone)]
pub struct LockRequest {
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    pub user_id: UserId,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum LockAttempt {
    /// `change` пустой, если владелец просто продлил свою блокировку.
    Granted { lock: SeatLock, change: Option<SeatChange> },
    HeldByOther(SeatLock),
    Booked,
}

#[derive(Debug, Clone)]
pub enum ReleaseAttempt {
    Released(SeatChange),
    /// Истёкшая блокировка удалена, место освободилось для зрителей.
    Expired(SeatChange),
    /// Блокировки нет.
    Absent,
    HeldByOther,
}

/// Бронь, прошедшая проверки каталога. `seat_ids` отсортированы и без повторов.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub booking_number: String,
    pub user_id: UserId,
    pub showing_id: ShowingId,
    pub seat_ids: Vec<SeatId>,
    pub total_price: f64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CommitAttempt {
    Committed { booking: Booking, changes: Vec<SeatChange> },
    Conflicts(Vec<SeatConflict>),
    DuplicateBookingNumber,
}

#[derive(Debug, Clone)]
pub enum CancelAttempt {
    Cancelled { booking: Booking, changes: Vec<SeatChange> },
    /// Бронь уже не подтверждена, менять нечего.
    Unchanged(Booking),
    NotFound,
    NotOwner,
}

/// Снимок занятости мест сеанса, прочитанный за один раз.
#[derive(Debug, Clone, Default)]
pub struct ShowingClaims {
    pub booked: HashSet<SeatId>,
    pub locks: HashMap<SeatId, SeatLock>,
}

impl ShowingClaims {
    pub fn claim_for(&self, seat_id: SeatId) -> SeatClaim {
        if self.booked.contains(&seat_id) {
            SeatClaim::Booked
        } else if let Some(lock) = self.locks.get(&seat_id) {
            SeatClaim::Locked { owner: lock.user_id }
        } else {
            SeatClaim::Free
        }
    }
}

#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Условная запись «нет живой блокировки или она моя», атомарно
    /// вместе с проверкой, что место не выкуплено.
    async fn acquire_lock(&self, request: LockRequest) -> Result<LockAttempt, StoreError>;

    async fn release_lock(
        &self,
        showing_id: ShowingId,
        seat_id: SeatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseAttempt, StoreError>;

    /// Всё или ничего: перепроверка всех мест, вставка брони и мест,
    /// снятие блокировок в одной атомарной единице.
    async fn commit_booking(&self, draft: BookingDraft) -> Result<CommitAttempt, StoreError>;

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CancelAttempt, StoreError>;

    /// Живые блокировки и выкупленные места сеанса одним согласованным чтением.
    async fn claims(
        &self,
        showing_id: ShowingId,
        now: DateTime<Utc>,
    ) -> Result<ShowingClaims, StoreError>;

    /// Вычищает истёкшие блокировки. Корректность от этого не зависит,
    /// истёкшие блокировки и так считаются отсутствующими.
    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<SeatChange>, StoreError>;

    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError>;

    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;
}
