pub mod booking;
pub mod cleanup;
pub mod locks;
pub mod seat_map;

pub use booking::{BookingEngine, NewBooking};
pub use cleanup::CleanupService;
pub use locks::{LockGrant, LockService, ReleaseOutcome};
pub use seat_map::ShowingGateway;

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::catalog::SeatCatalog;
use crate::error::BookingError;
use crate::models::{SeatId, Showing, ShowingId};

/// Сеанс, на который сейчас можно ставить блокировки и брони.
/// Несуществующий сеанс для записи неотличим от прошедшего.
pub(crate) async fn bookable_showing(
    catalog: &dyn SeatCatalog,
    showing_id: ShowingId,
    now: DateTime<Utc>,
) -> Result<Showing, BookingError> {
    match catalog.showing(showing_id).await? {
        Some(showing) if showing.is_bookable(now) => Ok(showing),
        _ => Err(BookingError::ShowingUnavailable { showing_id }),
    }
}

/// Проверяет, что все места из зала сеанса. Ошибка называет все чужие места.
pub(crate) async fn ensure_seats_in_theater(
    catalog: &dyn SeatCatalog,
    showing: &Showing,
    seat_ids: &[SeatId],
) -> Result<(), BookingError> {
    let known: HashSet<SeatId> = catalog
        .seats_for_theater(showing.theater_id)
        .await?
        .into_iter()
        .map(|seat| seat.id)
        .collect();

    let unknown: Vec<SeatId> = seat_ids.iter().copied().filter(|id| !known.contains(id)).collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(BookingError::InvalidSeat { seat_ids: unknown })
    }
}
