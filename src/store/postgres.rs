use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    BookingDraft, CancelAttempt, CommitAttempt, LockAttempt, LockRequest, ReleaseAttempt,
    SeatLedger, ShowingClaims,
};
use crate::database::Database;
use crate::error::{ConflictReason, SeatConflict, StoreError};
use crate::models::{
    Booking, BookingId, BookingStatus, SeatChange, SeatClaim, SeatId, SeatLock, ShowingId, UserId,
};

const BOOKING_NUMBER_CONSTRAINT: &str = "uq_bookings_booking_number";
const ACTIVE_CLAIM_CONSTRAINT: &str = "uq_booking_seats_active_claim";
const PURGE_BATCH: i64 = 500;

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.booking_number, b.user_id, b.showing_id, b.total_price, b.status,
           COALESCE(
               ARRAY_AGG(bs.seat_id ORDER BY bs.seat_id) FILTER (WHERE bs.seat_id IS NOT NULL),
               '{}'
           ) AS seat_ids,
           b.created_at, b.updated_at
    FROM bookings b
    LEFT JOIN booking_seats bs ON bs.booking_id = b.id
"#;

/// Хранилище на Postgres. Атомарный примитив: транзакционная advisory-блокировка
/// на каждую пару (showing_id, seat_id), которую берут все изменяющие операции
/// (в отсортированном порядке), плюс общая для блокировки и брони проверка
/// занятости `claim_conflicts`.
#[derive(Clone)]
pub struct PgLedger {
    db: Database,
}

impl PgLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// `seat_ids` должны быть отсортированы, иначе две брони могут взаимно заблокироваться.
async fn guard_seats(
    conn: &mut PgConnection,
    showing_id: ShowingId,
    seat_ids: &[SeatId],
) -> Result<(), sqlx::Error> {
    for seat_id in seat_ids {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{showing_id}:{seat_id}"))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Какие из мест user_id забрать не может: выкуплены или под чужой живой блокировкой.
async fn claim_conflicts(
    conn: &mut PgConnection,
    showing_id: ShowingId,
    seat_ids: &[SeatId],
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<HashMap<SeatId, ConflictReason>, sqlx::Error> {
    let rows: Vec<(SeatId, bool)> = sqlx::query_as(
        r#"
        SELECT seat_id, TRUE AS booked
        FROM booking_seats
        WHERE showing_id = $1 AND seat_id = ANY($2) AND active
        UNION ALL
        SELECT seat_id, FALSE AS booked
        FROM seat_locks
        WHERE showing_id = $1 AND seat_id = ANY($2) AND expires_at > $3 AND user_id <> $4
        "#,
    )
    .bind(showing_id)
    .bind(seat_ids)
    .bind(now)
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut conflicts = HashMap::new();
    for (seat_id, booked) in rows {
        let reason = if booked { ConflictReason::Booked } else { ConflictReason::Locked };
        conflicts
            .entry(seat_id)
            .and_modify(|existing| {
                if reason == ConflictReason::Booked {
                    *existing = reason;
                }
            })
            .or_insert(reason);
    }
    Ok(conflicts)
}

async fn current_lock(
    conn: &mut PgConnection,
    showing_id: ShowingId,
    seat_id: SeatId,
) -> Result<Option<SeatLock>, sqlx::Error> {
    sqlx::query_as::<_, SeatLock>(
        "SELECT showing_id, seat_id, user_id, acquired_at, expires_at
         FROM seat_locks
         WHERE showing_id = $1 AND seat_id = $2",
    )
    .bind(showing_id)
    .bind(seat_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Версии берутся, пока места под advisory-блокировкой.
async fn next_versions(conn: &mut PgConnection, count: usize) -> Result<Vec<u64>, sqlx::Error> {
    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT nextval('seat_event_seq') FROM generate_series(1, $1)")
            .bind(count as i32)
            .fetch_all(&mut *conn)
            .await?;
    Ok(versions.into_iter().map(|v| v as u64).collect())
}

async fn seat_changes(
    conn: &mut PgConnection,
    showing_id: ShowingId,
    seat_ids: &[SeatId],
    claim: SeatClaim,
) -> Result<Vec<SeatChange>, sqlx::Error> {
    let versions = next_versions(conn, seat_ids.len()).await?;
    Ok(seat_ids
        .iter()
        .zip(versions)
        .map(|(&seat_id, version)| SeatChange { showing_id, seat_id, claim, version })
        .collect())
}

async fn load_booking(
    conn: &mut PgConnection,
    booking_id: BookingId,
) -> Result<Option<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(&format!("{BOOKING_SELECT} WHERE b.id = $1 GROUP BY b.id"))
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

#[async_trait]
impl SeatLedger for PgLedger {
    async fn acquire_lock(&self, request: LockRequest) -> Result<LockAttempt, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        guard_seats(&mut tx, request.showing_id, &[request.seat_id]).await?;

        let conflicts = claim_conflicts(
            &mut tx,
            request.showing_id,
            &[request.seat_id],
            request.user_id,
            request.now,
        )
        .await?;
        let previous = current_lock(&mut tx, request.showing_id, request.seat_id).await?;

        match (conflicts.get(&request.seat_id), previous.clone()) {
            (Some(ConflictReason::Booked), _) => {
                tx.rollback().await?;
                return Ok(LockAttempt::Booked);
            }
            (Some(ConflictReason::Locked), Some(holder)) => {
                tx.rollback().await?;
                return Ok(LockAttempt::HeldByOther(holder));
            }
            _ => {}
        }

        // Compare-and-set: перезаписать можно только свою или истёкшую блокировку.
        let lock: Option<SeatLock> = sqlx::query_as(
            r#"
            INSERT INTO seat_locks (showing_id, seat_id, user_id, acquired_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (showing_id, seat_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                acquired_at = CASE
                    WHEN seat_locks.user_id = EXCLUDED.user_id AND seat_locks.expires_at > $4
                    THEN seat_locks.acquired_at
                    ELSE EXCLUDED.acquired_at
                END,
                expires_at = EXCLUDED.expires_at
            WHERE seat_locks.user_id = EXCLUDED.user_id OR seat_locks.expires_at <= $4
            RETURNING showing_id, seat_id, user_id, acquired_at, expires_at
            "#,
        )
        .bind(request.showing_id)
        .bind(request.seat_id)
        .bind(request.user_id)
        .bind(request.now)
        .bind(request.expires_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(lock) = lock else {
            tx.rollback().await?;
            return match previous {
                Some(holder) => Ok(LockAttempt::HeldByOther(holder)),
                None => Err(StoreError::Unavailable("seat lock upsert lost its row".to_string())),
            };
        };

        let refreshed = previous
            .as_ref()
            .is_some_and(|p| p.user_id == request.user_id && p.is_live(request.now));
        let change = if refreshed {
            None
        } else {
            let claim = SeatClaim::Locked { owner: request.user_id };
            seat_changes(&mut tx, request.showing_id, &[request.seat_id], claim)
                .await?
                .pop()
        };

        tx.commit().await?;
        Ok(LockAttempt::Granted { lock, change })
    }

    async fn release_lock(
        &self,
        showing_id: ShowingId,
        seat_id: SeatId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseAttempt, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        guard_seats(&mut tx, showing_id, &[seat_id]).await?;

        let outcome = match current_lock(&mut tx, showing_id, seat_id).await? {
            None => ReleaseAttempt::Absent,
            Some(lock) if !lock.is_live(now) => {
                sqlx::query(
                    "DELETE FROM seat_locks WHERE showing_id = $1 AND seat_id = $2 AND expires_at <= $3",
                )
                .bind(showing_id)
                .bind(seat_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                let mut changes = seat_changes(&mut tx, showing_id, &[seat_id], SeatClaim::Free).await?;
                match changes.pop() {
                    Some(change) => ReleaseAttempt::Expired(change),
                    None => ReleaseAttempt::Absent,
                }
            }
            Some(lock) if lock.user_id != user_id => ReleaseAttempt::HeldByOther,
            Some(_) => {
                sqlx::query("DELETE FROM seat_locks WHERE showing_id = $1 AND seat_id = $2 AND user_id = $3")
                    .bind(showing_id)
                    .bind(seat_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                let mut changes = seat_changes(&mut tx, showing_id, &[seat_id], SeatClaim::Free).await?;
                match changes.pop() {
                    Some(change) => ReleaseAttempt::Released(change),
                    None => ReleaseAttempt::Absent,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn commit_booking(&self, draft: BookingDraft) -> Result<CommitAttempt, StoreError> {
        let mut tx = self.db.pool.begin().await?;
        guard_seats(&mut tx, draft.showing_id, &draft.seat_ids).await?;

        let conflicts =
            claim_conflicts(&mut tx, draft.showing_id, &draft.seat_ids, draft.user_id, draft.now)
                .await?;
        if !conflicts.is_empty() {
            tx.rollback().await?;
            let seats = draft
                .seat_ids
                .iter()
                .filter_map(|seat_id| {
                    conflicts
                        .get(seat_id)
                        .map(|&reason| SeatConflict { seat_id: *seat_id, reason })
                })
                .collect();
            return Ok(CommitAttempt::Conflicts(seats));
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

        let inserted = sqlx::query(
            "INSERT INTO bookings (id, booking_number, user_id, showing_id, total_price, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(booking.id)
        .bind(&booking.booking_number)
        .bind(booking.user_id)
        .bind(booking.showing_id)
        .bind(booking.total_price)
        .bind(booking.status)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = inserted {
            let _ = tx.rollback().await;
            if violates(&err, BOOKING_NUMBER_CONSTRAINT) {
                debug!(booking_number = %draft.booking_number, "booking number collision");
                return Ok(CommitAttempt::DuplicateBookingNumber);
            }
            return Err(err.into());
        }

        let claimed = sqlx::query(
            "INSERT INTO booking_seats (booking_id, showing_id, seat_id, active, created_at)
             SELECT $1, $2, seat_id, TRUE, $4 FROM UNNEST($3::uuid[]) AS seat_id",
        )
        .bind(booking.id)
        .bind(booking.showing_id)
        .bind(&booking.seat_ids)
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = claimed {
            let _ = tx.rollback().await;
            if violates(&err, ACTIVE_CLAIM_CONSTRAINT) {
                // Сюда не должны попадать при взятых advisory-блокировках.
                warn!(showing_id = %draft.showing_id, "active claim constraint rejected booking");
                let seats = draft
                    .seat_ids
                    .iter()
                    .map(|&seat_id| SeatConflict { seat_id, reason: ConflictReason::Booked })
                    .collect();
                return Ok(CommitAttempt::Conflicts(seats));
            }
            return Err(err.into());
        }

        sqlx::query("DELETE FROM seat_locks WHERE showing_id = $1 AND seat_id = ANY($2)")
            .bind(booking.showing_id)
            .bind(&booking.seat_ids)
            .execute(&mut *tx)
            .await?;

        let changes =
            seat_changes(&mut tx, booking.showing_id, &booking.seat_ids, SeatClaim::Booked).await?;

        tx.commit().await?;
        Ok(CommitAttempt::Committed { booking, changes })
    }

    async fn cancel_booking(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CancelAttempt, StoreError> {
        let mut tx = self.db.pool.begin().await?;

        let row: Option<(UserId, ShowingId, BookingStatus)> = sqlx::query_as(
            "SELECT user_id, showing_id, status FROM bookings WHERE id = $1 FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((owner, showing_id, status)) = row else {
            tx.rollback().await?;
            return Ok(CancelAttempt::NotFound);
        };
        if owner != user_id {
            tx.rollback().await?;
            return Ok(CancelAttempt::NotOwner);
        }
        if !status.occupies_seats() {
            let booking = load_booking(&mut tx, booking_id).await?;
            tx.rollback().await?;
            return match booking {
                Some(booking) => Ok(CancelAttempt::Unchanged(booking)),
                None => Ok(CancelAttempt::NotFound),
            };
        }

        let seat_ids: Vec<SeatId> = sqlx::query_scalar(
            "SELECT seat_id FROM booking_seats WHERE booking_id = $1 AND active ORDER BY seat_id",
        )
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await?;
        guard_seats(&mut tx, showing_id, &seat_ids).await?;

        sqlx::query("UPDATE bookings SET status = 'cancelled', updated_at = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE booking_seats SET active = FALSE WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        let changes = seat_changes(&mut tx, showing_id, &seat_ids, SeatClaim::Free).await?;
        let booking = load_booking(&mut tx, booking_id)
            .await?
            .ok_or_else(|| StoreError::Unavailable("booking vanished during cancel".to_string()))?;

        tx.commit().await?;
        Ok(CancelAttempt::Cancelled { booking, changes })
    }

    async fn claims(
        &self,
        showing_id: ShowingId,
        now: DateTime<Utc>,
    ) -> Result<ShowingClaims, StoreError> {
        // Одно выражение = один снимок, без чередования с параллельными записями.
        let rows = sqlx::query(
            r#"
            SELECT seat_id, NULL::uuid AS user_id,
                   NULL::timestamptz AS acquired_at, NULL::timestamptz AS expires_at
            FROM booking_seats
            WHERE showing_id = $1 AND active
            UNION ALL
            SELECT seat_id, user_id, acquired_at, expires_at
            FROM seat_locks
            WHERE showing_id = $1 AND expires_at > $2
            "#,
        )
        .bind(showing_id)
        .bind(now)
        .fetch_all(&self.db.pool)
        .await
        .map_err(StoreError::from)?;

        let mut claims = ShowingClaims::default();
        for row in rows {
            let seat_id: SeatId = row.try_get("seat_id").map_err(StoreError::from)?;
            let user_id: Option<UserId> = row.try_get("user_id").map_err(StoreError::from)?;
            let acquired_at: Option<DateTime<Utc>> = row.try_get("acquired_at").map_err(StoreError::from)?;
            let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").map_err(StoreError::from)?;

            match (user_id, acquired_at, expires_at) {
                (Some(user_id), Some(acquired_at), Some(expires_at)) => {
                    claims.locks.insert(
                        seat_id,
                        SeatLock { showing_id, seat_id, user_id, acquired_at, expires_at },
                    );
                }
                _ => {
                    claims.booked.insert(seat_id);
                }
            }
        }
        Ok(claims)
    }

    async fn purge_expired_locks(&self, now: DateTime<Utc>) -> Result<Vec<SeatChange>, StoreError> {
        let candidates: Vec<(ShowingId, SeatId)> = sqlx::query_as(
            "SELECT showing_id, seat_id FROM seat_locks
             WHERE expires_at <= $1
             ORDER BY expires_at
             LIMIT $2",
        )
        .bind(now)
        .bind(PURGE_BATCH)
        .fetch_all(&self.db.pool)
        .await?;

        let mut changes = Vec::new();
        for (showing_id, seat_id) in candidates {
            let mut tx = self.db.pool.begin().await?;
            guard_seats(&mut tx, showing_id, &[seat_id]).await?;

            let deleted = sqlx::query(
                "DELETE FROM seat_locks WHERE showing_id = $1 AND seat_id = $2 AND expires_at <= $3",
            )
            .bind(showing_id)
            .bind(seat_id)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if deleted > 0 {
                changes.extend(seat_changes(&mut tx, showing_id, &[seat_id], SeatClaim::Free).await?);
            }
            tx.commit().await?;
        }
        Ok(changes)
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.db.pool.acquire().await?;
        Ok(load_booking(&mut conn, booking_id).await?)
    }

    async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "{BOOKING_SELECT} WHERE b.user_id = $1 GROUP BY b.id ORDER BY b.created_at DESC, b.id"
        ))
        .bind(user_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(bookings)
    }
}
