//! Fine model and the overdue fee formula

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::FineStatus;
use crate::error::{AppError, AppResult};

/// Fine model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub user_id: i32,
    pub loan_id: Option<i32>,
    #[schema(value_type = String, example = "15.00")]
    pub amount: Decimal,
    pub reason: String,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Staff member who waived the fine
    pub waived_by: Option<i32>,
    pub waived_at: Option<DateTime<Utc>>,
}

impl Fine {
    /// Refuse any move out of a terminal state
    pub fn check_transition(&self, next: FineStatus) -> AppResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "Fine {} is {} and cannot become {}",
                self.id, self.status, next
            )))
        }
    }

    /// Only unsettled fines may be hard deleted
    pub fn check_deletable(&self) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Fine {} is {} and cannot be deleted",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// Fine plus the names a dashboard displays
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FineDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fine: Fine,
    pub user_name: String,
    pub user_email: String,
    pub item_title: Option<String>,
}

/// `days × rate`, rounded half away from zero to cents
pub fn overdue_fine_amount(days_overdue: i64, per_day: Decimal) -> Decimal {
    (Decimal::from(days_overdue) * per_day)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn overdue_reason(days_overdue: i64) -> String {
    let unit = if days_overdue == 1 { "day" } else { "days" };
    format!("Late return fee - {} {} overdue", days_overdue, unit)
}

/// New fine ready to insert
#[derive(Debug, Clone)]
pub struct NewFine {
    pub user_id: i32,
    pub loan_id: Option<i32>,
    pub amount: Decimal,
    pub reason: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Manual fine request (staff)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateFine {
    pub user_id: i32,
    pub loan_id: Option<i32>,
    #[schema(value_type = String, example = "5.00")]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Waive request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct WaiveFine {
    /// Appended to the fine reason
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Fine listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct FineQuery {
    pub status: Option<FineStatus>,
    pub user_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Totals per status
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FineTotals {
    #[schema(value_type = String)]
    pub pending: Decimal,
    #[schema(value_type = String)]
    pub paid: Decimal,
    #[schema(value_type = String)]
    pub waived: Decimal,
}

impl FineTotals {
    pub fn from_fines<'a>(fines: impl IntoIterator<Item = &'a Fine>) -> Self {
        fines.into_iter().fold(Self::default(), |mut totals, fine| {
            match fine.status {
                FineStatus::Pending => totals.pending += fine.amount,
                FineStatus::Paid => totals.paid += fine.amount,
                FineStatus::Waived => totals.waived += fine.amount,
            }
            totals
        })
    }
}

/// A patron's fines with per-status totals
#[derive(Debug, Serialize, ToSchema)]
pub struct UserFines {
    pub fines: Vec<FineDetails>,
    pub totals: FineTotals,
}

/// Result of an overdue scan
#[derive(Debug, Serialize, ToSchema)]
pub struct OverdueCalculation {
    /// Number of fines created by this run
    pub created: usize,
    pub fines: Vec<Fine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate() -> Decimal {
        Decimal::new(150, 2)
    }

    #[test]
    fn test_amount_matches_daily_rate() {
        assert_eq!(overdue_fine_amount(10, rate()).to_string(), "15.00");
        assert_eq!(overdue_fine_amount(5, rate()).to_string(), "7.50");
        assert_eq!(overdue_fine_amount(1, rate()).to_string(), "1.50");
    }

    #[test]
    fn test_amount_rounds_to_cents() {
        // 3 × 0.335 = 1.005 rounds up
        assert_eq!(overdue_fine_amount(3, Decimal::new(335, 3)).to_string(), "1.01");
    }

    #[test]
    fn test_reason_mentions_days() {
        assert_eq!(overdue_reason(10), "Late return fee - 10 days overdue");
        assert!(overdue_reason(1).ends_with("1 day overdue"));
    }

    fn fine(amount: i64, status: FineStatus) -> Fine {
        Fine {
            id: 0,
            user_id: 1,
            loan_id: None,
            amount: Decimal::new(amount, 2),
            reason: String::new(),
            status,
            created_at: Utc::now(),
            due_date: None,
            paid_at: None,
            waived_by: None,
            waived_at: None,
        }
    }

    #[test]
    fn test_settled_fines_reject_every_transition() {
        let pending = fine(150, FineStatus::Pending);
        assert!(pending.check_transition(FineStatus::Paid).is_ok());
        assert!(pending.check_transition(FineStatus::Waived).is_ok());
        assert!(pending.check_deletable().is_ok());

        for settled in [fine(150, FineStatus::Paid), fine(150, FineStatus::Waived)] {
            for next in [FineStatus::Pending, FineStatus::Paid, FineStatus::Waived] {
                assert!(matches!(
                    settled.check_transition(next),
                    Err(AppError::InvalidTransition(_))
                ));
            }
            assert!(matches!(settled.check_deletable(), Err(AppError::InvalidTransition(_))));
        }
    }

    #[test]
    fn test_totals_by_status() {
        let fines = vec![
            fine(750, FineStatus::Pending),
            fine(150, FineStatus::Pending),
            fine(1500, FineStatus::Paid),
            fine(300, FineStatus::Waived),
        ];
        let totals = FineTotals::from_fines(&fines);
        assert_eq!(totals.pending, Decimal::new(900, 2));
        assert_eq!(totals.paid, Decimal::new(1500, 2));
        assert_eq!(totals.waived, Decimal::new(300, 2));
    }
}
