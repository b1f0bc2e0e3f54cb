//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::page_bounds;
use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanDetails, LoanDetailsRow, LoanQuery},
};

const DETAILS_SELECT: &str = r#"
    SELECT l.*, i.title AS item_title, i.unique_item_id, i.item_type,
           u.name AS user_name, u.email AS user_email
    FROM loans l
    JOIN library_items i ON i.id = l.item_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get loan with item and user details
    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        let row = sqlx::query_as::<_, LoanDetailsRow>(&format!("{} WHERE l.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;
        Ok(LoanDetails::from_row(row, Utc::now()))
    }

    /// Lock a loan row for the rest of the transaction
    pub async fn lock_for_update(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// All loans of a user, open ones first
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            "{} WHERE l.user_id = $1 ORDER BY (l.status = 'BORROWED') DESC, l.due_date, l.id",
            DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        Ok(rows.into_iter().map(|r| LoanDetails::from_row(r, now)).collect())
    }

    /// List loans with filters and pagination
    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (limit, offset) = page_bounds(query.page, query.per_page);

        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            r#"{}
            WHERE ($1::text IS NULL OR l.status = $1)
              AND ($2::int IS NULL OR l.user_id = $2)
            ORDER BY l.loan_date DESC, l.id DESC
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
            SELECT COUNT(*) FROM loans l
            WHERE ($1::text IS NULL OR l.status = $1)
              AND ($2::int IS NULL OR l.user_id = $2)
            "#,
        )
        .bind(query.status)
        .bind(query.user_id)
        .fetch_one(&self.pool)
        .await?;

        let now = Utc::now();
        Ok((rows.into_iter().map(|r| LoanDetails::from_row(r, now)).collect(), total))
    }

    /// Borrowed loans whose due date has passed, most late first
    pub async fn get_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            "{} WHERE l.status = 'BORROWED' AND l.due_date < $1 ORDER BY l.due_date, l.id",
            DETAILS_SELECT
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| LoanDetails::from_row(r, now)).collect())
    }

    /// Overdue loans that carry no pending or paid fine yet
    pub async fn get_overdue_unfined(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT l.* FROM loans l
            WHERE l.status = 'BORROWED'
              AND l.due_date < $1
              AND NOT EXISTS (
                  SELECT 1 FROM fines f
                  WHERE f.loan_id = l.id AND f.status IN ('PENDING', 'PAID')
              )
            ORDER BY l.due_date, l.id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Number of items a user currently holds
    pub async fn count_active_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1 AND status = 'BORROWED'")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count)
    }

    /// Whether the item is currently out on loan
    pub async fn item_has_open_loan(&self, item_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE item_id = $1 AND status = 'BORROWED')",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether the user currently holds this item
    pub async fn user_holds_item(&self, user_id: i32, item_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND item_id = $2 AND status = 'BORROWED')",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Insert a new BORROWED loan
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        item_id: i32,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, item_id, loan_date, due_date, status, renew_count)
            VALUES ($1, $2, $3, $4, 'BORROWED', 0)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(loan_date)
        .bind(due_date)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::ItemNotAvailable("Item is already on loan".to_string())
            }
            other => other.into(),
        })?;
        Ok(loan)
    }

    pub async fn mark_returned(
        &self,
        conn: &mut PgConnection,
        id: i32,
        return_date: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET status = 'RETURNED', return_date = $2
            WHERE id = $1 AND status = 'BORROWED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(return_date)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::InvalidTransition("Loan already returned".to_string()))?;
        Ok(loan)
    }

    pub async fn renew(&self, conn: &mut PgConnection, id: i32, due_date: DateTime<Utc>) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET due_date = $2, renew_count = renew_count + 1
            WHERE id = $1 AND status = 'BORROWED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(due_date)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::InvalidTransition("Cannot renew a returned loan".to_string()))?;
        Ok(loan)
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = 'BORROWED'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count overdue loans
    pub async fn count_overdue(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE status = 'BORROWED' AND due_date < NOW()",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
