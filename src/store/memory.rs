use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    BookingDraft, CancelAttempt, CommitAttempt, LockAttempt, LockRequest, ReleaseAttempt,
    SeatLedger, ShowingClaims,
};
use crate::error::{ConflictReason, SeatConflict, StoreError};
use crate::models::{
    Booking, BookingId, BookingStatus, SeatChange, SeatClaim, SeatId, SeatLock, ShowingId, UserId,
};

/// Занятость мест одного сеанса. Все изменения идут под его мьютексом,
/// так что разные сеансы не мешают друг другу.
#[derive(Debug, Default)]
struct ShowingLedger {
    locks: HashMap<SeatId, SeatLock>,
    booked: HashMap<SeatId, BookingId>,
}

impl ShowingLedger {
    /// Общая проверка «может ли user_id забрать место» для блокировки и брони.
    fn conflict_for(&self, seat_id: SeatId, user_id: UserId, now: DateTime<Utc>) -> Option<ConflictReason> {
        if self.booked.contains_key(&seat_id) {
            return Some(ConflictReason::Booked);
        }
        match self.locks.get(&seat_id) {
            Some(lock) if lock.is_live(now) && lock.user_id != user_id => Some(ConflictReason::Locked),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BookingBook {
    by_id: HashMap<BookingId, Booking>,
    numbers: HashSet<String>,
}

/// Хранилище в памяти процесса. Порядок захвата: мьютекс сеанса, потом книга броней.
#[derive(Default)]
pub struct MemoryLedger {
    showings: RwLock<HashMap<ShowingId, Arc<Mutex<ShowingLedger>>>>,
    bookings: Mutex<BookingBook>,
    versions: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ledger(&self, showing_id: ShowingId) -> Arc<Mutex<ShowingLedger>> {
        if let Some(ledger) = self.showings.read().await.get(&showing_id) {
            return ledger.clone();
        }
        self.showings
            .write()
            .await
            .entry(showing_id)
            .or_default()
            .clone()
    }

    #[cfg(test)]
    async fn tracked_showings(&self) -> usize {
        self.showings.read().await.len()
    }

    /// Вызывать только под мьютексом сеанса.
    fn change(&self, showing_id: ShowingId, seat_id: SeatId, claim: SeatClaim) -> SeatChange {
        SeatChange {
            showing_id,
            seat_id,
            claim,
            version: self.versions.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

#[async_trait]
impl SeatLedger for MemoryLedger {
    async fn acquire_lock(&self, request: LockRequest) -> Result<LockAttempt, StoreError> {
        let ledger = self.ledger(request.showing_id).await;
        let mut ledger = ledger.lock().await;

        match ledger.conflict_for(request.seat_id, request.user_id, request.now) {
            Some(ConflictReason::Booked) => return Ok(LockAttempt::Booked),
            Some(ConflictReason::Locked) => {
                let holder = ledger.locks.get(&request.seat_id).cloned().ok_or_else(|| {
                    StoreError::Unavailable("lock disappeared while guarded".to_string())
                })?;
                return Ok(LockAttempt::HeldByOther(holder));
            }
            None => {}
        }

        let previous = ledger
            .locks
            .get(&request.seat_id)
            .filter(|lock| lock.is_live(request.now))
            .cloned();
        let refreshed = previous.is_some();

        let lock = SeatLock {
            showing_id: request.showing_id,
            seat_id: request.seat_id,
            user_id: request.user_id,
            acquired_at: previous.map_or(request.now, |p| p.acquired_at),
            expires_at: request.expires_at,
        };
        ledger.locks.insert(request.seat_id, lock.clone());

        let change = (!refreshed).then(|| {
            self.change(
                request.showing_id,
                request.seat_id,
                SeatClaim::Locked { owner: request.user_id },
            )
        });
        Ok(LockAttempt::Granted { lock, change })
    }

    async fn release_lock(
        &self,
        showing_id: ShowingId,
        seat_id: SeatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseAttempt, StoreError> {
        // Снятие не заводит запись сеанса: нет записи, нет и блокировки.
        let Some(ledger) = self.showings.read().await.get(&showing_id).cloned() else {
            return Ok(ReleaseAttempt::Absent);
        };
        let mut ledger = ledger.lock().await;

        let (live, owner) = match ledger.locks.get(&seat_id) {
            Some(lock) => (lock.is_live(now), lock.user_id),
            None => return Ok(ReleaseAttempt::Absent),
        };
        if !live {
            ledger.locks.remove(&seat_id);
            return Ok(ReleaseAttempt::Expired(self.change(showing_id, seat_id, SeatClaim::Free)));
        }
        if owner != user_id {
            return Ok(ReleaseAttempt::HeldByOther);
        }

        ledger.locks.remove(&seat_id);
        Ok(ReleaseAttempt::Released(self.change(showing_id, seat_id, SeatClaim::Free)))
    }

    async fn commit_booking(&self, draft: BookingDraft) -> Result<CommitAttempt, StoreError> {
        let ledger = self.ledger(draft.showing_id).await;
        let mut ledger = ledger.lock().await;

        let conflicts: Vec<SeatConflict> = draft
            .seat_ids
            .iter()
            .filter_map(|&seat_id| {
                ledger
                    .conflict_for(seat_id, draft.user_id, draft.now)
                    .map(|reason| SeatConflict { seat_id, reason })
            })
            .collect();
        if !conflicts.is_empty() {
            return Ok(CommitAttempt::Conflicts(conflicts));
        }

        let mut book = self.bookings.lock().await;
        if book.numbers.contains(&draft.booking_number) {
            return Ok(CommitAttempt::DuplicateBookingNumber);
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            booking_number: draft.booking_number.clone(),
            user_id: draft.user_id,
            showing_id: draft.showing_id,
            total_price: draft.total_price,
            status: BookingStatus::Confirmed,
            seat_ids: draft.seat_ids.clone(),
            created_at: draft.now,
            updated_at: draft.now,
        };

        let mut changes = Vec::with_capacity(draft.seat_ids.len());
        for &seat_id in &draft.seat_ids {
            ledger.locks.remove(&seat_id);
            ledger.booked.insert(seat_id, booking.id);
            changes.push(self.change(draft.showing_id, seat_id, SeatClaim::Booked));
        }
        book.numbers.insert(draft.booking_number);
        book.by_id.insert(booking.id, booking.clone());

        Ok(CommitAttempt::Committed { booking, changes })
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CancelAttempt, StoreError> {
        let showing_id = {
            let book = self.bookings.lock().await;
            match book.by_id.get(&booking_id) {
                None => return Ok(CancelAttempt::NotFound),
                Some(b) if b.user_id != user_id => return Ok(CancelAttempt::NotOwner),
                Some(b) if !b.status.occupies_seats() => return Ok(CancelAttempt::Unchanged(b.clone())),
                Some(b) => b.showing_id,
            }
        };

        let ledger = self.ledger(showing_id).await;
        let mut ledger = ledger.lock().await;
        let mut book = self.bookings.lock().await;

        let booking = book
            .by_id
            .get_mut(&booking_id)
            .ok_or_else(|| StoreError::Unavailable("booking disappeared during cancel".to_string()))?;
        // Пока мы ждали мьютекс сеанса, бронь могли отменить параллельно.
        if !booking.status.occupies_seats() {
            return Ok(CancelAttempt::Unchanged(booking.clone()));
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;

        let mut changes = Vec::with_capacity(booking.seat_ids.len());
        for &seat_id in &booking.seat_ids {
            if ledger.booked.get(&seat_id) == Some(&booking_id) {
                ledger.booked.remove(&seat_id);
                changes.push(self.change(showing_id, seat_id, SeatClaim::Free));
            }
        }

        Ok(CancelAttempt::Cancelled { booking: booking.clone(), changes })
    }

    async fn claims(
        &self,
        showing_id: ShowingId,
        now: DateTime<Utc>,
    ) -> Result<ShowingClaims, StoreError> {
        let Some(ledger) = self.showings.read().await.get(&showing_id).cloned() else {
            return Ok(ShowingClaims::default());
        };
        let ledger = ledger.lock().await;

        Ok(ShowingClaims {
            booked: ledger.booked.keys().copied().collect(),
            locks: ledger
                .locks
                .iter()
                .filter(|(_, lock)| lock.is_live(now))
                .map(|(seat_id, lock)| (*seat_id, lock.clone()))
                .collect(),
        })
    }

    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<SeatChange>, StoreError> {
        let ledgers: Vec<(ShowingId, Arc<Mutex<ShowingLedger>>)> = self
            .showings
            .read()
            .await
            .iter()
            .map(|(id, ledger)| (*id, ledger.clone()))
            .collect();

        let mut changes = Vec::new();
        for (showing_id, ledger) in ledgers {
            let mut ledger = ledger.lock().await;
            let expired: Vec<SeatId> = ledger
                .locks
                .iter()
                .filter(|(_, lock)| !lock.is_live(now))
                .map(|(seat_id, _)| *seat_id)
                .collect();
            for seat_id in expired {
                ledger.locks.remove(&seat_id);
                changes.push(self.change(showing_id, seat_id, SeatClaim::Free));
            }
        }

        // Пустые записи сеансов убираем. Под блокировкой карты новых ссылок не
        // появится, а strong_count == 1 значит, что запись никто не держит.
        self.showings.write().await.retain(|_, ledger| {
            Arc::strong_count(ledger) > 1
                || ledger
                    .try_lock()
                    .map_or(true, |l| !l.locks.is_empty() || !l.booked.is_empty())
        });
        Ok(changes)
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().await.by_id.get(&booking_id).cloned())
    }

    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let book = self.bookings.lock().await;
        let mut bookings: Vec<Booking> = book
            .by_id
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lock_request(showing_id: ShowingId, seat_id: SeatId, user_id: UserId, now: DateTime<Utc>) -> LockRequest {
        LockRequest {
            showing_id,
            seat_id,
            user_id,
            now,
            expires_at: now + Duration::seconds(120),
        }
    }

    fn draft(showing_id: ShowingId, user_id: UserId, seat_ids: Vec<SeatId>, now: DateTime<Utc>) -> BookingDraft {
        BookingDraft {
            booking_number: format!("BK-{}", Uuid::new_v4().simple()),
            user_id,
            showing_id,
            seat_ids,
            total_price: 10.0,
            now,
        }
    }

    #[tokio::test]
    async fn versions_grow_for_the_same_seat() {
        let ledger = MemoryLedger::new();
        let (showing, seat, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        let LockAttempt::Granted { change: Some(locked), .. } =
            ledger.acquire_lock(lock_request(showing, seat, user, now)).await.unwrap()
        else {
            panic!("expected a fresh grant");
        };
        let ReleaseAttempt::Released(released) =
            ledger.release_lock(showing, seat, user, now).await.unwrap()
        else {
            panic!("expected release");
        };

        assert!(released.version > locked.version);
        assert_eq!(released.claim, SeatClaim::Free);
    }

    #[tokio::test]
    async fn refresh_keeps_acquired_at_and_emits_nothing() {
        let ledger = MemoryLedger::new();
        let (showing, seat, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        ledger.acquire_lock(lock_request(showing, seat, user, now)).await.unwrap();
        let later = now + Duration::seconds(30);
        match ledger.acquire_lock(lock_request(showing, seat, user, later)).await.unwrap() {
            LockAttempt::Granted { lock, change } => {
                assert!(change.is_none());
                assert_eq!(lock.acquired_at, now);
                assert_eq!(lock.expires_at, later + Duration::seconds(120));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn commit_consumes_own_locks_and_rejects_foreign_ones() {
        let ledger = MemoryLedger::new();
        let showing = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        ledger.acquire_lock(lock_request(showing, a, x, now)).await.unwrap();
        ledger.acquire_lock(lock_request(showing, b, y, now)).await.unwrap();

        match ledger.commit_booking(draft(showing, x, vec![a, b], now)).await.unwrap() {
            CommitAttempt::Conflicts(conflicts) => {
                assert_eq!(conflicts, vec![SeatConflict { seat_id: b, reason: ConflictReason::Locked }]);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Неудачная бронь ничего не трогает.
        let claims = ledger.claims(showing, now).await.unwrap();
        assert!(claims.booked.is_empty());
        assert_eq!(claims.locks.len(), 2);

        let CommitAttempt::Committed { changes, .. } =
            ledger.commit_booking(draft(showing, x, vec![a], now)).await.unwrap()
        else {
            panic!("expected commit");
        };
        assert_eq!(changes.len(), 1);
        let claims = ledger.claims(showing, now).await.unwrap();
        assert_eq!(claims.claim_for(a), SeatClaim::Booked);
        assert!(!claims.locks.contains_key(&a));
    }

    #[tokio::test]
    async fn duplicate_booking_number_is_reported_not_committed() {
        let ledger = MemoryLedger::new();
        let showing = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut first = draft(showing, user, vec![Uuid::new_v4()], now);
        first.booking_number = "BK-FIXED".to_string();
        let mut second = draft(showing, user, vec![Uuid::new_v4()], now);
        second.booking_number = "BK-FIXED".to_string();

        assert!(matches!(ledger.commit_booking(first).await.unwrap(), CommitAttempt::Committed { .. }));
        assert!(matches!(
            ledger.commit_booking(second.clone()).await.unwrap(),
            CommitAttempt::DuplicateBookingNumber
        ));
        let claims = ledger.claims(showing, now).await.unwrap();
        assert!(!claims.booked.contains(&second.seat_ids[0]));
    }

    #[tokio::test]
    async fn purge_only_touches_expired_locks() {
        let ledger = MemoryLedger::new();
        let showing = Uuid::new_v4();
        let (old_seat, fresh_seat) = (Uuid::new_v4(), Uuid::new_v4());
        let user = Uuid::new_v4();
        let now = Utc::now();

        ledger.acquire_lock(lock_request(showing, old_seat, user, now)).await.unwrap();
        let later = now + Duration::seconds(100);
        ledger.acquire_lock(lock_request(showing, fresh_seat, user, later)).await.unwrap();

        let purged = ledger.purge_expired_locks(now + Duration::seconds(121)).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].seat_id, old_seat);
        assert_eq!(purged[0].claim, SeatClaim::Free);
    }

    #[tokio::test]
    async fn release_on_unknown_showing_leaves_no_trace() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();

        for _ in 0..100 {
            let attempt = ledger
                .release_lock(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), now)
                .await
                .unwrap();
            assert!(matches!(attempt, ReleaseAttempt::Absent));
        }
        assert_eq!(ledger.tracked_showings().await, 0);
    }

    #[tokio::test]
    async fn releasing_expired_lock_frees_the_seat() {
        let ledger = MemoryLedger::new();
        let (showing, seat) = (Uuid::new_v4(), Uuid::new_v4());
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        ledger.acquire_lock(lock_request(showing, seat, x, now)).await.unwrap();
        let later = now + Duration::seconds(121);
        let ReleaseAttempt::Expired(change) = ledger.release_lock(showing, seat, y, later).await.unwrap() else {
            panic!("expected expired lock to be dropped");
        };
        assert_eq!(change.seat_id, seat);
        assert_eq!(change.claim, SeatClaim::Free);

        assert!(matches!(
            ledger.release_lock(showing, seat, y, later).await.unwrap(),
            ReleaseAttempt::Absent
        ));
        assert!(ledger.purge_expired_locks(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_forgets_showings_without_claims() {
        let ledger = MemoryLedger::new();
        let (showing, seat, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        ledger.acquire_lock(lock_request(showing, seat, user, now)).await.unwrap();
        assert!(ledger.purge_expired_locks(now).await.unwrap().is_empty());
        assert_eq!(ledger.tracked_showings().await, 1);

        let purged = ledger.purge_expired_locks(now + Duration::seconds(121)).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(ledger.tracked_showings().await, 0);
    }
}
