use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{bookable_showing, ensure_seats_in_theater};
use crate::broadcast::Broadcaster;
use crate::catalog::SeatCatalog;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::models::{Booking, BookingId, SeatId, ShowingId, UserId};
use crate::store::{BookingDraft, CancelAttempt, CommitAttempt, SeatLedger};

/// Сколько раз пробуем новый номер брони при коллизии.
pub const MAX_BOOKING_NUMBER_ATTEMPTS: usize = 5;

pub type BookingNumberGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBooking {
    pub showing_id: ShowingId,
    #[validate(length(min = 1, message = "at least one seat is required"))]
    pub seat_ids: Vec<SeatId>,
    #[validate(range(min = 0.0, message = "total_price must not be negative"))]
    pub total_price: f64,
}

/// `BK-` и 10 символов верхнего регистра.
pub fn generate_booking_number() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("BK-{}", &raw[..10])
}

pub struct BookingEngine {
    catalog: Arc<dyn SeatCatalog>,
    ledger: Arc<dyn SeatLedger>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    numbers: BookingNumberGenerator,
}

impl BookingEngine {
    pub fn new(
        catalog: Arc<dyn SeatCatalog>,
        ledger: Arc<dyn SeatLedger>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            broadcaster,
            clock,
            numbers: Arc::new(generate_booking_number),
        }
    }

    pub fn with_number_generator(mut self, numbers: BookingNumberGenerator) -> Self {
        self.numbers = numbers;
        self
    }

    /// Оформляет бронь на весь набор мест или ни на одно.
    ///
    /// Проверки каталога (сеанс, принадлежность мест залу) делаются заранее,
    /// а занятость мест перепроверяется хранилищем в той же атомарной операции,
    /// что и запись брони.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        request: NewBooking,
    ) -> Result<Booking, BookingError> {
        request
            .validate()
            .map_err(|e| BookingError::InvalidRequest(e.to_string()))?;
        if !request.total_price.is_finite() {
            return Err(BookingError::InvalidRequest("total_price must be a finite number".into()));
        }

        let seat_ids: Vec<SeatId> = request
            .seat_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let showing_id = request.showing_id;

        let now = self.clock.now();
        let showing = bookable_showing(self.catalog.as_ref(), showing_id, now).await?;
        ensure_seats_in_theater(self.catalog.as_ref(), &showing, &seat_ids).await?;

        for attempt in 1..=MAX_BOOKING_NUMBER_ATTEMPTS {
            let draft = BookingDraft {
                booking_number: (self.numbers)(),
                user_id,
                showing_id,
                seat_ids: seat_ids.clone(),
                total_price: request.total_price,
                now,
            };

            match self.ledger.commit_booking(draft).await? {
                CommitAttempt::Committed { booking, changes } => {
                    info!(
                        booking_id = %booking.id,
                        booking_number = %booking.booking_number,
                        %showing_id,
                        %user_id,
                        seats = booking.seat_ids.len(),
                        "booking confirmed"
                    );
                    self.broadcaster.publish(&changes);
                    return Ok(booking);
                }
                CommitAttempt::Conflicts(seats) => {
                    debug!(%showing_id, %user_id, failed = seats.len(), "booking rejected: seat conflict");
                    return Err(BookingError::SeatConflict { seats });
                }
                CommitAttempt::DuplicateBookingNumber => {
                    warn!(attempt, "booking number collision, regenerating");
                }
            }
        }

        Err(BookingError::StorageUnavailable(
            "could not allocate a unique booking number".to_string(),
        ))
    }

    /// Отмена освобождает места. Повторная отмена возвращает бронь как есть.
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        match self.ledger.cancel_booking(booking_id, user_id, now).await? {
            CancelAttempt::Cancelled { booking, changes } => {
                info!(%booking_id, showing_id = %booking.showing_id, %user_id, "booking cancelled");
                self.broadcaster.publish(&changes);
                Ok(booking)
            }
            CancelAttempt::Unchanged(booking) => Ok(booking),
            CancelAttempt::NotFound => Err(BookingError::NotFound { entity: "booking", id: booking_id }),
            CancelAttempt::NotOwner => Err(BookingError::NotOwner),
        }
    }

    pub async fn booking(&self, booking_id: BookingId, user_id: UserId) -> Result<Booking, BookingError> {
        match self.ledger.booking(booking_id).await? {
            Some(booking) if booking.user_id == user_id => Ok(booking),
            Some(_) => Err(BookingError::NotOwner),
            None => Err(BookingError::NotFound { entity: "booking", id: booking_id }),
        }
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.ledger.bookings_for_user(user_id).await?)
    }
}
