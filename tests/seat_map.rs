mod common;

use common::{user, Fixture};
use showtime_booking::error::BookingError;
use showtime_booking::models::SeatState;
use showtime_booking::services::NewBooking;
use uuid::Uuid;

fn state_of(map: &showtime_booking::models::SeatMap, number: &str) -> SeatState {
    map.seats
        .iter()
        .find(|view| view.seat.seat_number == number)
        .map(|view| view.state)
        .unwrap_or_else(|| panic!("seat {number} missing from map"))
}

#[tokio::test]
async fn states_depend_on_who_is_asking() {
    let fx = Fixture::new().await;
    let (x, y) = (user(), user());
    let showing = fx.showing.id;

    fx.state.locks.acquire(showing, fx.seat("A1"), x).await.unwrap();
    fx.state
        .bookings
        .create_booking(y, NewBooking { showing_id: showing, seat_ids: vec![fx.seat("A2")], total_price: 0.0 })
        .await
        .unwrap();

    let mine = fx.state.seat_maps.seat_map(showing, Some(x)).await.unwrap();
    assert_eq!(state_of(&mine, "A1"), SeatState::LockedByYou);
    assert_eq!(state_of(&mine, "A2"), SeatState::Booked);
    assert_eq!(state_of(&mine, "A3"), SeatState::Available);

    let theirs = fx.state.seat_maps.seat_map(showing, Some(y)).await.unwrap();
    assert_eq!(state_of(&theirs, "A1"), SeatState::LockedByOther);

    let anonymous = fx.state.seat_maps.seat_map(showing, None).await.unwrap();
    assert_eq!(state_of(&anonymous, "A1"), SeatState::LockedByOther);
}

#[tokio::test]
async fn expired_lock_reads_as_available() {
    let fx = Fixture::new().await;
    let x = user();

    fx.state.locks.acquire(fx.showing.id, fx.seat("A1"), x).await.unwrap();
    fx.expire_locks();

    let map = fx.state.seat_maps.seat_map(fx.showing.id, Some(x)).await.unwrap();
    assert_eq!(state_of(&map, "A1"), SeatState::Available);
}

#[tokio::test]
async fn map_lists_every_seat_in_row_order() {
    let fx = Fixture::new().await;

    let map = fx.state.seat_maps.seat_map(fx.showing.id, None).await.unwrap();
    assert_eq!(map.theater_id, fx.theater.id);
    assert!(map.bookable);
    let numbers: Vec<&str> = map.seats.iter().map(|v| v.seat.seat_number.as_str()).collect();
    assert_eq!(numbers.len(), 15);
    assert_eq!(&numbers[..6], &["A1", "A2", "A3", "A4", "A5", "B1"]);
}

#[tokio::test]
async fn finished_showing_is_readable_but_not_bookable() {
    let fx = Fixture::new().await;
    fx.finish_showing();

    let map = fx.state.seat_maps.seat_map(fx.showing.id, None).await.unwrap();
    assert!(!map.bookable);
}

#[tokio::test]
async fn unknown_showing_is_not_found() {
    let fx = Fixture::new().await;
    let err = fx.state.seat_maps.seat_map(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound { entity: "showing", .. }));
}
