//! Рассылка изменений занятости мест всем, кто смотрит схему зала сеанса.
//! Доставка best-effort: пропавший зритель переподключается и перечитывает
//! схему целиком.

use serde::{Deserialize, Serialize};

use crate::models::{SeatChange, SeatId, SeatState, ShowingId};

pub mod registry;
pub mod relay;

pub use registry::{ViewerId, ViewerRegistry, ViewerSubscription};
pub use relay::RedisBroadcaster;

/// Вызывается после фиксации изменения, вне критической секции хранилища.
/// Не блокирует и не возвращает ошибок: сбой рассылки не должен ронять бронь.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, changes: &[SeatChange]);
}

/// Сообщение, которое получает зритель. `state` посчитан для него лично.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatStateEvent {
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    pub state: SeatState,
}
