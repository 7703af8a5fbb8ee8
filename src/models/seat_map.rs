use serde::{Deserialize, Serialize};

use super::{Seat, SeatId, ShowingId, TheaterId, UserId};

/// Состояние места с точки зрения конкретного зрителя.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    LockedByYou,
    LockedByOther,
    Booked,
}

/// Кто сейчас держит место на сеансе. В отличие от `SeatState`
/// не зависит от того, кто смотрит.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatClaim {
    Free,
    Locked { owner: UserId },
    Booked,
}

impl SeatClaim {
    pub fn state_for(&self, viewer: Option<UserId>) -> SeatState {
        match self {
            SeatClaim::Free => SeatState::Available,
            SeatClaim::Booked => SeatState::Booked,
            SeatClaim::Locked { owner } if Some(*owner) == viewer => SeatState::LockedByYou,
            SeatClaim::Locked { .. } => SeatState::LockedByOther,
        }
    }
}

/// Изменение занятости места. `version` выдаётся хранилищем, пока место
/// под его исключительной блокировкой, поэтому для одного места версии
/// строго растут в порядке фиксации.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatChange {
    pub showing_id: ShowingId,
    pub seat_id: SeatId,
    pub claim: SeatClaim,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    #[serde(flatten)]
    pub seat: Seat,
    pub state: SeatState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMap {
    pub showing_id: ShowingId,
    pub theater_id: TheaterId,
    pub bookable: bool,
    pub seats: Vec<SeatView>,
}
