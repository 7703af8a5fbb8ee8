pub mod theater;
pub mod seat;
pub mod showing;
pub mod lock;
pub mod booking;
pub mod seat_map;

pub use theater::{Theater, TheaterId};
pub use seat::{Seat, SeatClass, SeatId};
pub use showing::{Showing, ShowingId};
pub use lock::SeatLock;
pub use booking::{Booking, BookingId, BookingStatus};
pub use seat_map::{SeatChange, SeatClaim, SeatMap, SeatState, SeatView};

/// Идентификатор пользователя приходит от внешнего identity-провайдера,
/// ядро ему доверяет и ничего не проверяет.
pub type UserId = uuid::Uuid;
