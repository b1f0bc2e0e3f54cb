//! Fines service: overdue reconciliation and the PENDING -> PAID / WAIVED lifecycle

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use validator::Validate;

use super::email::EmailService;
use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        enums::FineStatus,
        fine::{
            overdue_fine_amount, overdue_reason, CreateFine, Fine, FineDetails, FineQuery, FineTotals,
            NewFine, OverdueCalculation, UserFines, WaiveFine,
        },
        loan::Loan,
        user::UserClaims,
    },
    repository::Repository,
};

/// Fines owed for a batch of overdue loans.
///
/// Loans less than one full day late are skipped so no zero-amount fine is
/// ever produced.
pub fn build_overdue_fines(loans: &[Loan], now: DateTime<Utc>, rules: &CirculationConfig) -> Vec<NewFine> {
    let due_date = now + Duration::days(rules.fine_payment_days);
    loans
        .iter()
        .filter_map(|loan| {
            let days = loan.days_overdue(now);
            if days < 1 {
                return None;
            }
            Some(NewFine {
                user_id: loan.user_id,
                loan_id: Some(loan.id),
                amount: overdue_fine_amount(days, rules.fine_per_day),
                reason: overdue_reason(days),
                due_date: Some(due_date),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
    rules: CirculationConfig,
    email: EmailService,
}

impl FinesService {
    pub fn new(repository: Repository, rules: CirculationConfig, email: EmailService) -> Self {
        Self {
            repository,
            rules,
            email,
        }
    }

    /// Fine every overdue loan that has no pending or paid fine yet
    pub async fn calculate_overdue(&self, actor_id: i32) -> AppResult<OverdueCalculation> {
        let now = Utc::now();
        let loans = self.repository.loans.get_overdue_unfined(now).await?;
        let candidates = build_overdue_fines(&loans, now, &self.rules);

        let mut fines = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            // None means a concurrent run fined this loan first
            if let Some(fine) = self.repository.fines.insert(candidate).await? {
                fines.push(fine);
            }
        }

        let total: Decimal = fines.iter().map(|f| f.amount).sum();
        tracing::info!(
            actor_id,
            scanned = loans.len(),
            created = fines.len(),
            total = %total,
            "Overdue fine calculation finished"
        );

        Ok(OverdueCalculation {
            created: fines.len(),
            fines,
        })
    }

    /// Issue a fine by hand
    pub async fn create(&self, actor_id: i32, request: &CreateFine) -> AppResult<Fine> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation("Fine amount must be greater than zero".to_string()));
        }

        self.repository.users.get_by_id(request.user_id).await?;

        if let Some(loan_id) = request.loan_id {
            let loan = self.repository.loans.get_by_id(loan_id).await?;
            if loan.user_id != request.user_id {
                return Err(AppError::Validation(format!(
                    "Loan {} does not belong to user {}",
                    loan_id, request.user_id
                )));
            }
        }

        let due_date = request
            .due_date
            .unwrap_or_else(|| Utc::now() + Duration::days(self.rules.fine_payment_days));

        let fine = self
            .repository
            .fines
            .insert(&NewFine {
                user_id: request.user_id,
                loan_id: request.loan_id,
                amount: request.amount.round_dp(2),
                reason: request.reason.trim().to_string(),
                due_date: Some(due_date),
            })
            .await?
            .ok_or_else(|| AppError::Conflict("Loan already has an open fine".to_string()))?;

        tracing::info!(fine_id = fine.id, actor_id, user_id = fine.user_id, amount = %fine.amount, "Fine created");
        Ok(fine)
    }

    /// Explain why a conditional update touched nothing
    async fn lost_race(&self, id: i32, next: FineStatus) -> AppError {
        match self.repository.fines.get_by_id(id).await {
            Ok(fine) => fine.check_transition(next).err().unwrap_or_else(|| {
                AppError::InvalidTransition(format!("Fine {} changed concurrently", id))
            }),
            Err(e) => e,
        }
    }

    pub async fn pay(&self, actor_id: i32, id: i32) -> AppResult<Fine> {
        self.repository.fines.get_by_id(id).await?.check_transition(FineStatus::Paid)?;

        let Some(fine) = self.repository.fines.mark_paid(id, Utc::now()).await? else {
            return Err(self.lost_race(id, FineStatus::Paid).await);
        };
        tracing::info!(fine_id = id, actor_id, amount = %fine.amount, "Fine paid");
        Ok(fine)
    }

    pub async fn waive(&self, actor_id: i32, id: i32, request: &WaiveFine) -> AppResult<Fine> {
        request.validate()?;
        let note = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        self.repository.fines.get_by_id(id).await?.check_transition(FineStatus::Waived)?;

        let Some(fine) = self
            .repository
            .fines
            .mark_waived(id, actor_id, Utc::now(), note)
            .await?
        else {
            return Err(self.lost_race(id, FineStatus::Waived).await);
        };
        tracing::info!(fine_id = id, actor_id, amount = %fine.amount, "Fine waived");
        Ok(fine)
    }

    /// Hard delete; only PENDING fines can go
    pub async fn delete(&self, actor_id: i32, id: i32) -> AppResult<()> {
        self.repository.fines.get_by_id(id).await?.check_deletable()?;

        if !self.repository.fines.delete_pending(id).await? {
            return Err(match self.repository.fines.get_by_id(id).await {
                Ok(fine) => fine.check_deletable().err().unwrap_or_else(|| {
                    AppError::InvalidTransition(format!("Fine {} changed concurrently", id))
                }),
                Err(e) => e,
            });
        }
        tracing::info!(fine_id = id, actor_id, "Fine deleted");
        Ok(())
    }

    /// Email the fine's owner. Delivery failure is reported, not raised.
    pub async fn send_reminder(&self, id: i32) -> AppResult<bool> {
        let details = self.repository.fines.get_details(id).await?;
        if details.fine.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Fine {} is {} and needs no reminder",
                id, details.fine.status
            )));
        }

        match self
            .email
            .send_fine_reminder(&details.user_email, &details.user_name, &details.fine)
            .await
        {
            Ok(()) => {
                tracing::info!(fine_id = id, "Fine reminder sent");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(fine_id = id, "Failed to send fine reminder: {}", e);
                Ok(false)
            }
        }
    }

    pub async fn get(&self, actor: &UserClaims, id: i32) -> AppResult<FineDetails> {
        let details = self.repository.fines.get_details(id).await?;
        actor.require_self_or_staff(details.fine.user_id)?;
        Ok(details)
    }

    pub async fn get_user_fines(&self, user_id: i32) -> AppResult<UserFines> {
        let fines = self.repository.fines.get_user_fines(user_id).await?;
        let totals = FineTotals::from_fines(fines.iter().map(|d| &d.fine));
        Ok(UserFines { fines, totals })
    }

    pub async fn list(&self, query: &FineQuery) -> AppResult<(Vec<FineDetails>, i64)> {
        self.repository.fines.list(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::LoanStatus;

    fn overdue_loan(id: i32, hours_late: i64, now: DateTime<Utc>) -> Loan {
        Loan {
            id,
            user_id: 100 + id,
            item_id: 200 + id,
            loan_date: now - Duration::days(30),
            due_date: now - Duration::hours(hours_late),
            return_date: None,
            status: LoanStatus::Borrowed,
            renew_count: 0,
        }
    }

    #[test]
    fn test_overdue_fines_use_whole_days() {
        let now = Utc::now();
        let rules = CirculationConfig::default();
        let loans = vec![overdue_loan(1, 10 * 24 + 5, now), overdue_loan(2, 24, now)];

        let fines = build_overdue_fines(&loans, now, &rules);
        assert_eq!(fines.len(), 2);
        assert_eq!(fines[0].amount, Decimal::new(1500, 2));
        assert_eq!(fines[0].reason, "Late return fee - 10 days overdue");
        assert_eq!(fines[0].loan_id, Some(1));
        assert_eq!(fines[0].user_id, 101);
        assert_eq!(fines[1].amount, Decimal::new(150, 2));
        assert_eq!(fines[1].reason, "Late return fee - 1 day overdue");
        assert_eq!(fines[1].due_date, Some(now + Duration::days(rules.fine_payment_days)));
    }

    #[test]
    fn test_less_than_a_day_late_is_not_fined() {
        let now = Utc::now();
        let loans = vec![overdue_loan(1, 23, now)];
        assert!(build_overdue_fines(&loans, now, &CirculationConfig::default()).is_empty());
    }

    #[test]
    fn test_returned_loans_are_never_fined() {
        let now = Utc::now();
        let mut loan = overdue_loan(1, 72, now);
        loan.status = LoanStatus::Returned;
        loan.return_date = Some(now);
        assert!(build_overdue_fines(&[loan], now, &CirculationConfig::default()).is_empty());
    }

    #[test]
    fn test_rate_comes_from_config() {
        let now = Utc::now();
        let rules = CirculationConfig {
            fine_per_day: Decimal::new(25, 2),
            ..CirculationConfig::default()
        };
        let fines = build_overdue_fines(&[overdue_loan(1, 3 * 24, now)], now, &rules);
        assert_eq!(fines[0].amount, Decimal::new(75, 2));
    }
}
