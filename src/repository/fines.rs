//! Fines repository

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use super::page_bounds;
use crate::{
    error::{AppError, AppResult},
    models::fine::{Fine, FineDetails, FineQuery, NewFine},
};

const DETAILS_SELECT: &str = r#"
    SELECT f.*, u.name AS user_name, u.email AS user_email, i.title AS item_title
    FROM fines f
    JOIN users u ON u.id = f.user_id
    LEFT JOIN loans l ON l.id = f.loan_id
    LEFT JOIN library_items i ON i.id = l.item_id
"#;

#[derive(Clone)]
pub struct FinesRepository {
    pool: Pool<Postgres>,
}

impl FinesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Fine> {
        sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<FineDetails> {
        sqlx::query_as::<_, FineDetails>(&format!("{} WHERE f.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine with id {} not found", id)))
    }

    pub async fn get_user_fines(&self, user_id: i32) -> AppResult<Vec<FineDetails>> {
        let rows = sqlx::query_as::<_, FineDetails>(&format!(
            "{} WHERE f.user_id = $1 ORDER BY (f.status = 'PENDING') DESC, f.created_at DESC, f.id DESC",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<FineDetails>, i64)> {
        let (limit, offset) = page_bounds(query.page, query.per_page);

        let rows = sqlx::query_as::<_, FineDetails>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR f.status = $1)
              AND ($2::int IS NULL OR f.user_id = $2)
            ORDER BY f.created_at DESC, f.id DESC
            LIMIT $3 OFFSET $4
            "#,
            DETAILS_SELECT
        ))
        .bind(query.status)
        .bind(query.user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM fines f
            WHERE ($1::text IS NULL OR f.status = $1)
              AND ($2::int IS NULL OR f.user_id = $2)
            "#,
        )
        .bind(query.status)
        .bind(query.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Insert a PENDING fine.
    ///
    /// Returns `None` when the loan already carries a PENDING or PAID fine;
    /// the partial unique index `fines_one_open_per_loan` makes this safe
    /// against concurrent overdue scans.
    pub async fn insert(&self, fine: &NewFine) -> AppResult<Option<Fine>> {
        let created = sqlx::query_as::<_, Fine>(
            r#"
            INSERT INTO fines (user_id, loan_id, amount, reason, status, due_date)
            VALUES ($1, $2, $3, $4, 'PENDING', $5)
            ON CONFLICT (loan_id) WHERE status IN ('PENDING', 'PAID') DO NOTHING
            RETURNING *
            "#,
        )
        .bind(fine.user_id)
        .bind(fine.loan_id)
        .bind(fine.amount)
        .bind(&fine.reason)
        .bind(fine.due_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(created)
    }

    /// PENDING -> PAID; `None` if the fine is not pending
    pub async fn mark_paid(&self, id: i32, paid_at: DateTime<Utc>) -> AppResult<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines SET status = 'PAID', paid_at = $2
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(paid_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fine)
    }

    /// PENDING -> WAIVED; `None` if the fine is not pending
    pub async fn mark_waived(
        &self,
        id: i32,
        waived_by: i32,
        waived_at: DateTime<Utc>,
        note: Option<&str>,
    ) -> AppResult<Option<Fine>> {
        let fine = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines
            SET status = 'WAIVED',
                waived_by = $2,
                waived_at = $3,
                reason = CASE WHEN $4::text IS NULL THEN reason
                              ELSE reason || ' (waived: ' || $4 || ')' END
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(waived_by)
        .bind(waived_at)
        .bind(note)
        .fetch_optional(&self.pool)
        .await?;
        Ok(fine)
    }

    /// Hard delete a PENDING fine; `false` if it is not pending
    pub async fn delete_pending(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM fines WHERE id = $1 AND status = 'PENDING'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sum of a user's pending fines
    pub async fn pending_total_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM fines WHERE user_id = $1 AND status = 'PENDING'",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(total)
    }

    /// (count, total) of all pending fines
    pub async fn pending_summary(&self) -> AppResult<(i64, Decimal)> {
        let row: (i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM fines WHERE status = 'PENDING'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
