use std::sync::Arc;

use crate::catalog::SeatCatalog;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::models::{SeatMap, SeatView, ShowingId, UserId};
use crate::store::SeatLedger;

/// Чтение схемы зала: каталог + снимок занятости из хранилища.
/// Побочных эффектов нет.
pub struct ShowingGateway {
    catalog: Arc<dyn SeatCatalog>,
    ledger: Arc<dyn SeatLedger>,
    clock: Arc<dyn Clock>,
}

impl ShowingGateway {
    pub fn new(catalog: Arc<dyn SeatCatalog>, ledger: Arc<dyn SeatLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { catalog, ledger, clock }
    }

    /// Схема читается и для прошедшего сеанса, тогда `bookable = false`.
    pub async fn seat_map(
        &self,
        showing_id: ShowingId,
        viewer: Option<UserId>,
    ) -> Result<SeatMap, BookingError> {
        let now = self.clock.now();
        let showing = self
            .catalog
            .showing(showing_id)
            .await?
            .ok_or(BookingError::NotFound { entity: "showing", id: showing_id })?;

        let seats = self.catalog.seats_for_theater(showing.theater_id).await?;
        let claims = self.ledger.claims(showing_id, now).await?;

        let seats = seats
            .into_iter()
            .map(|seat| {
                let state = claims.claim_for(seat.id).state_for(viewer);
                SeatView { seat, state }
            })
            .collect();

        Ok(SeatMap {
            showing_id,
            theater_id: showing.theater_id,
            bookable: showing.is_bookable(now),
            seats,
        })
    }
}
