//! Тесты на живом Postgres. Запуск:
//! `DATABASE_URL=postgres://... cargo test --test postgres_ledger -- --ignored`

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use showtime_booking::catalog::{PgCatalog, SeatCatalog};
use showtime_booking::database::Database;
use showtime_booking::models::{SeatClaim, SeatId, ShowingId};
use showtime_booking::store::{
    BookingDraft, CancelAttempt, CommitAttempt, LockAttempt, LockRequest, PgLedger, SeatLedger,
};

async fn database() -> Database {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let db = Database::new(&url, 10).await.unwrap();
    db.run_migrations().await.unwrap();
    db
}

/// Свежий зал с двумя местами и сеанс в нём.
async fn seed(db: &Database) -> (ShowingId, Vec<SeatId>) {
    let theater_id = Uuid::new_v4();
    sqlx::query("INSERT INTO theaters (id, name, location) VALUES ($1, 'Test', 'Nowhere')")
        .bind(theater_id)
        .execute(&db.pool)
        .await
        .unwrap();

    let mut seats = Vec::new();
    for column in 1..=2 {
        let seat_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO seats (id, theater_id, seat_number, row_label, column_number)
             VALUES ($1, $2, $3, 'A', $4)",
        )
        .bind(seat_id)
        .bind(theater_id)
        .bind(format!("A{column}"))
        .bind(column)
        .execute(&db.pool)
        .await
        .unwrap();
        seats.push(seat_id);
    }
    seats.sort();

    let showing_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO showings (id, theater_id, movie_id, starts_at, ends_at)
         VALUES ($1, $2, $3, NOW() + interval '1 hour', NOW() + interval '3 hours')",
    )
    .bind(showing_id)
    .bind(theater_id)
    .bind(Uuid::new_v4())
    .execute(&db.pool)
    .await
    .unwrap();

    (showing_id, seats)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_acquires_grant_exactly_one() {
    let db = database().await;
    let (showing_id, seats) = seed(&db).await;
    let ledger = Arc::new(PgLedger::new(db));
    let now = Utc::now();

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let ledger = ledger.clone();
            let request = LockRequest {
                showing_id,
                seat_id: seats[0],
                user_id: Uuid::new_v4(),
                now,
                expires_at: now + Duration::seconds(120),
            };
            tokio::spawn(async move { ledger.acquire_lock(request).await })
        })
        .collect();

    let mut granted = 0;
    for attempt in attempts {
        if let LockAttempt::Granted { .. } = attempt.await.unwrap().unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
#[ignore]
async fn commit_cancel_and_snapshot() {
    let db = database().await;
    let (showing_id, seats) = seed(&db).await;
    let catalog = PgCatalog::new(db.clone());
    let ledger = PgLedger::new(db);
    let user = Uuid::new_v4();
    let now = Utc::now();

    let showing = catalog.showing(showing_id).await.unwrap().unwrap();
    assert!(showing.is_bookable(now));
    assert_eq!(catalog.seats_for_theater(showing.theater_id).await.unwrap().len(), 2);

    let draft = BookingDraft {
        booking_number: format!("BK-{}", &Uuid::new_v4().simple().to_string()[..10]),
        user_id: user,
        showing_id,
        seat_ids: seats.clone(),
        total_price: 15.0,
        now,
    };
    let CommitAttempt::Committed { booking, changes } = ledger.commit_booking(draft.clone()).await.unwrap() else {
        panic!("expected commit");
    };
    assert_eq!(booking.seat_ids, seats);
    assert!(changes.iter().all(|c| c.claim == SeatClaim::Booked));

    // Тот же номер брони ловится ограничением уникальности.
    let mut again = draft;
    again.seat_ids = vec![];
    assert!(matches!(
        ledger.commit_booking(again).await.unwrap(),
        CommitAttempt::DuplicateBookingNumber
    ));

    let claims = ledger.claims(showing_id, now).await.unwrap();
    assert_eq!(claims.booked.len(), 2);

    let CancelAttempt::Cancelled { changes, .. } = ledger.cancel_booking(booking.id, user, now).await.unwrap() else {
        panic!("expected cancel");
    };
    assert_eq!(changes.len(), 2);
    assert!(ledger.claims(showing_id, now).await.unwrap().booked.is_empty());
    assert!(matches!(
        ledger.cancel_booking(booking.id, user, now).await.unwrap(),
        CancelAttempt::Unchanged(_)
    ));

    let stored = ledger.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.seat_ids, seats);
}
