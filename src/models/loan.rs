//! Loan (borrow) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::enums::{ItemType, LoanStatus};

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renew_count: i32,
}

impl Loan {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        overdue_state(self.status, self.due_date, now).0
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        overdue_state(self.status, self.due_date, now).1
    }
}

/// `(is_overdue, days_overdue)` for a loan as of `now`.
///
/// Overdue means still out and past the due date; returned loans report zero days.
pub fn overdue_state(status: LoanStatus, due_date: DateTime<Utc>, now: DateTime<Utc>) -> (bool, i64) {
    if status != LoanStatus::Borrowed {
        return (false, 0);
    }
    (due_date < now, days_overdue(due_date, now))
}

/// Whole days elapsed since `due_date`, floored, never negative
pub fn days_overdue(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now <= due_date {
        return 0;
    }
    (now - due_date).num_days()
}

/// Due date for a loan starting at `start`
pub fn due_date_from(start: DateTime<Utc>, loan_period_days: i64) -> DateTime<Utc> {
    start + Duration::days(loan_period_days)
}

/// Renewal extends from the later of today and the current due date
pub fn renewed_due_date(
    current_due: DateTime<Utc>,
    now: DateTime<Utc>,
    loan_period_days: i64,
) -> DateTime<Utc> {
    due_date_from(current_due.max(now), loan_period_days)
}

/// Joined row used to build `LoanDetails`
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    pub id: i32,
    pub user_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renew_count: i32,
    pub item_title: String,
    pub unique_item_id: String,
    pub item_type: ItemType,
    pub user_name: String,
    pub user_email: String,
}

/// Loan with full details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub user_id: i32,
    pub item_id: i32,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renew_count: i32,
    pub item_title: String,
    pub unique_item_id: String,
    pub item_type: ItemType,
    pub user_name: String,
    pub user_email: String,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

impl LoanDetails {
    pub fn from_row(row: LoanDetailsRow, now: DateTime<Utc>) -> Self {
        let (is_overdue, days) = overdue_state(row.status, row.due_date, now);
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            loan_date: row.loan_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status,
            renew_count: row.renew_count,
            item_title: row.item_title,
            unique_item_id: row.unique_item_id,
            item_type: row.item_type,
            user_name: row.user_name,
            user_email: row.user_email,
            is_overdue,
            days_overdue: days,
        }
    }
}

/// Loan listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub user_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
