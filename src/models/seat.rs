use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::TheaterId;

pub type SeatId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_class", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeatClass {
    Regular,
    Premium,
    Vip,
    Recliner,
}

/// Физическое место в зале. Места принадлежат залу, а не сеансу:
/// доступность всегда считается для пары (showing_id, seat_id).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub theater_id: TheaterId,
    pub seat_number: String,
    pub row_label: String,
    pub column_number: i32,
    pub seat_class: SeatClass,
}

impl Seat {
    /// Порядок вывода схемы зала: ряд, затем номер в ряду.
    pub fn display_order(a: &Seat, b: &Seat) -> std::cmp::Ordering {
        a.row_label
            .cmp(&b.row_label)
            .then(a.column_number.cmp(&b.column_number))
            .then(a.id.cmp(&b.id))
    }
}
