//! Reservations repository

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::page_bounds;
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::ReservationStatus,
        reservation::{Reservation, ReservationDetails, ReservationQuery},
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT r.*, i.title AS item_title, i.unique_item_id, u.name AS user_name,
           CASE WHEN r.status = 'PENDING' THEN (
               SELECT COUNT(*) FROM reservations q
               WHERE q.item_id = r.item_id
                 AND q.status = 'PENDING'
                 AND (q.created_at, q.id) <= (r.created_at, r.id)
           ) END AS queue_position
    FROM reservations r
    JOIN library_items i ON i.id = r.item_id
    JOIN users u ON u.id = r.user_id
"#;

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Flip elapsed PENDING reservations to EXPIRED; returns how many moved
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE reservations SET status = 'EXPIRED' WHERE status = 'PENDING' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<ReservationDetails> {
        sqlx::query_as::<_, ReservationDetails>(&format!("{} WHERE r.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn lock_for_update(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    pub async fn get_user_reservations(&self, user_id: i32) -> AppResult<Vec<ReservationDetails>> {
        let rows = sqlx::query_as::<_, ReservationDetails>(&format!(
            "{} WHERE r.user_id = $1 ORDER BY (r.status = 'PENDING') DESC, r.created_at DESC, r.id DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list(&self, query: &ReservationQuery) -> AppResult<(Vec<ReservationDetails>, i64)> {
        let (limit, offset) = page_bounds(query.page, query.per_page);

        let rows = sqlx::query_as::<_, ReservationDetails>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR r.status = $1)
              AND ($2::int IS NULL OR r.user_id = $2)
              AND ($3::int IS NULL OR r.item_id = $3)
            ORDER BY r.created_at, r.id
            LIMIT $4 OFFSET $5
            "#,
            DETAILS_SELECT
        ))
        .bind(query.status)
        .bind(query.user_id)
        .bind(query.item_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations r
            WHERE ($1::text IS NULL OR r.status = $1)
              AND ($2::int IS NULL OR r.user_id = $2)
              AND ($3::int IS NULL OR r.item_id = $3)
            "#,
        )
        .bind(query.status)
        .bind(query.user_id)
        .bind(query.item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Pending reservations for an item, oldest first
    pub async fn pending_for_item(&self, conn: &mut PgConnection, item_id: i32) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE item_id = $1 AND status = 'PENDING'
            ORDER BY created_at, id
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn create(
        &self,
        user_id: i32,
        item_id: i32,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, item_id, status, expires_at)
            VALUES ($1, $2, 'PENDING', $3)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("You already have a pending reservation for this item".to_string())
            }
            other => other.into(),
        })
    }

    /// Move a PENDING reservation to `status`; fails if it is no longer pending
    pub async fn transition(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ReservationStatus,
        loan_id: Option<i32>,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET status = $2, loan_id = COALESCE($3, loan_id)
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(loan_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            AppError::InvalidTransition(format!("Reservation {} is no longer pending", id))
        })
    }

    pub async fn count_pending(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
