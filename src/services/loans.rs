//! Loans service: checkout, return and renewal

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        enums::{ItemStatus, LoanStatus, ReservationStatus},
        loan::{days_overdue, due_date_from, renewed_due_date, Loan, LoanDetails, LoanQuery},
        reservation::{queue_head, Reservation},
        user::UserClaims,
    },
    repository::Repository,
};

/// What the checkout rules need to know about a borrower
#[derive(Debug, Clone)]
pub struct BorrowerStanding {
    pub is_active: bool,
    pub is_verified: bool,
    pub active_loans: i64,
    pub pending_fines: Decimal,
}

/// Account state, loan count and unpaid fines must all allow a new loan
pub fn check_borrower(standing: &BorrowerStanding, rules: &CirculationConfig) -> AppResult<()> {
    if !standing.is_active {
        return Err(AppError::Authorization("Account is deactivated".to_string()));
    }
    if !standing.is_verified {
        return Err(AppError::NotVerified("Account email is not verified".to_string()));
    }
    if standing.active_loans >= rules.max_active_loans {
        return Err(AppError::MaxLoansReached(format!(
            "Maximum of {} active loans reached",
            rules.max_active_loans
        )));
    }
    if standing.pending_fines > rules.max_unpaid_fines {
        return Err(AppError::BusinessRule(format!(
            "Unpaid fines of {} exceed the limit of {}",
            standing.pending_fines, rules.max_unpaid_fines
        )));
    }
    Ok(())
}

/// Resolve the reservation queue for a checkout.
///
/// Another patron at the head of the queue blocks the loan. When the borrower
/// has a pending reservation of their own, it is returned so it can be
/// fulfilled by the new loan.
pub fn check_queue(pending: &[Reservation], borrower_id: i32) -> AppResult<Option<i32>> {
    match queue_head(pending) {
        Some(head) if head.user_id != borrower_id => Err(AppError::ItemNotAvailable(
            "Item is reserved for another patron".to_string(),
        )),
        Some(head) => Ok(Some(head.id)),
        None => Ok(None),
    }
}

/// A loan can be renewed while it is out, on time, under the renewal cap
/// and nobody else is waiting for the item
pub fn check_renewal(
    loan: &Loan,
    now: DateTime<Utc>,
    max_renewals: i32,
    others_waiting: bool,
) -> AppResult<()> {
    if loan.status != LoanStatus::Borrowed {
        return Err(AppError::InvalidTransition("Only active loans can be renewed".to_string()));
    }
    if loan.is_overdue(now) {
        return Err(AppError::BusinessRule("Overdue loans cannot be renewed".to_string()));
    }
    if loan.renew_count >= max_renewals {
        return Err(AppError::BusinessRule(format!(
            "Maximum of {} renewals reached",
            max_renewals
        )));
    }
    if others_waiting {
        return Err(AppError::BusinessRule(
            "Item is reserved by another patron".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    rules: CirculationConfig,
}

impl LoansService {
    pub fn new(repository: Repository, rules: CirculationConfig) -> Self {
        Self { repository, rules }
    }

    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        self.repository.loans.get_details(id).await
    }

    /// All loans of a user, open ones first
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.get_user_loans(user_id).await
    }

    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.loans.list(query).await
    }

    pub async fn get_overdue(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.get_overdue(Utc::now()).await
    }

    /// Check an item out to a borrower
    pub async fn borrow(&self, borrower_id: i32, item_id: i32) -> AppResult<LoanDetails> {
        let now = Utc::now();
        self.repository.reservations.expire_stale(now).await?;

        let mut tx = self.repository.begin().await?;

        let borrower = self.repository.users.lock_for_update(&mut tx, borrower_id).await?;
        let item = self.repository.items.lock_for_update(&mut tx, item_id).await?;
        if !item.is_available() {
            return Err(AppError::ItemNotAvailable(format!(
                "Item {} is {}",
                item.unique_item_id, item.status
            )));
        }

        let standing = BorrowerStanding {
            is_active: borrower.is_active,
            is_verified: borrower.is_verified,
            active_loans: self.repository.loans.count_active_for_user(&mut tx, borrower_id).await?,
            pending_fines: self.repository.fines.pending_total_for_user(&mut tx, borrower_id).await?,
        };
        check_borrower(&standing, &self.rules)?;

        let pending = self.repository.reservations.pending_for_item(&mut tx, item_id).await?;
        let own_reservation = check_queue(&pending, borrower_id)?;

        let loan = self
            .repository
            .loans
            .create(&mut tx, borrower_id, item_id, now, due_date_from(now, self.rules.loan_period_days))
            .await?;
        self.repository.items.set_status(&mut tx, item_id, ItemStatus::Borrowed).await?;

        if let Some(reservation_id) = own_reservation {
            self.repository
                .reservations
                .transition(&mut tx, reservation_id, ReservationStatus::Fulfilled, Some(loan.id))
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = borrower_id,
            item_id,
            due_date = %loan.due_date,
            "Item checked out"
        );
        self.repository.loans.get_details(loan.id).await
    }

    /// Check an item back in
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<LoanDetails> {
        let now = Utc::now();
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock_for_update(&mut tx, loan_id).await?;
        self.repository.items.lock_for_update(&mut tx, loan.item_id).await?;

        let loan = self.repository.loans.mark_returned(&mut tx, loan.id, now).await?;
        self.repository
            .items
            .set_status(&mut tx, loan.item_id, ItemStatus::Available)
            .await?;

        tx.commit().await?;

        let days_late = days_overdue(loan.due_date, now);
        tracing::info!(loan_id, item_id = loan.item_id, days_late, "Item returned");
        self.repository.loans.get_details(loan_id).await
    }

    /// Extend a loan. Owners renew their own loans, staff renew any.
    pub async fn renew(&self, actor: &UserClaims, loan_id: i32) -> AppResult<LoanDetails> {
        let now = Utc::now();
        self.repository.reservations.expire_stale(now).await?;

        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock_for_update(&mut tx, loan_id).await?;
        actor.require_self_or_staff(loan.user_id)?;

        let pending = self.repository.reservations.pending_for_item(&mut tx, loan.item_id).await?;
        let others_waiting = pending.iter().any(|r| r.user_id != loan.user_id);
        check_renewal(&loan, now, self.rules.max_renewals, others_waiting)?;

        let due_date = renewed_due_date(loan.due_date, now, self.rules.loan_period_days);
        let loan = self.repository.loans.renew(&mut tx, loan.id, due_date).await?;

        tx.commit().await?;

        tracing::info!(loan_id, renew_count = loan.renew_count, due_date = %loan.due_date, "Loan renewed");
        self.repository.loans.get_details(loan_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn standing() -> BorrowerStanding {
        BorrowerStanding {
            is_active: true,
            is_verified: true,
            active_loans: 0,
            pending_fines: Decimal::ZERO,
        }
    }

    fn loan(due_in_days: i64, renew_count: i32) -> Loan {
        let now = Utc::now();
        Loan {
            id: 1,
            user_id: 10,
            item_id: 20,
            loan_date: now - Duration::days(14),
            due_date: now + Duration::days(due_in_days),
            return_date: None,
            status: LoanStatus::Borrowed,
            renew_count,
        }
    }

    fn pending(id: i32, user_id: i32, age_hours: i64) -> Reservation {
        let now = Utc::now();
        Reservation {
            id,
            user_id,
            item_id: 20,
            status: ReservationStatus::Pending,
            created_at: now - Duration::hours(age_hours),
            expires_at: now + Duration::days(7),
            loan_id: None,
        }
    }

    #[test]
    fn test_borrower_in_good_standing() {
        assert!(check_borrower(&standing(), &CirculationConfig::default()).is_ok());
    }

    #[test]
    fn test_borrower_limits() {
        let rules = CirculationConfig::default();

        let at_cap = BorrowerStanding { active_loans: rules.max_active_loans, ..standing() };
        assert!(matches!(check_borrower(&at_cap, &rules), Err(AppError::MaxLoansReached(_))));

        let at_fine_limit = BorrowerStanding { pending_fines: rules.max_unpaid_fines, ..standing() };
        assert!(check_borrower(&at_fine_limit, &rules).is_ok());

        let over_fine_limit = BorrowerStanding {
            pending_fines: rules.max_unpaid_fines + Decimal::new(1, 2),
            ..standing()
        };
        assert!(matches!(check_borrower(&over_fine_limit, &rules), Err(AppError::BusinessRule(_))));

        let inactive = BorrowerStanding { is_active: false, ..standing() };
        assert!(matches!(check_borrower(&inactive, &rules), Err(AppError::Authorization(_))));

        let unverified = BorrowerStanding { is_verified: false, ..standing() };
        assert!(matches!(check_borrower(&unverified, &rules), Err(AppError::NotVerified(_))));
    }

    #[test]
    fn test_queue_head_must_be_borrower() {
        assert_eq!(check_queue(&[], 1).unwrap(), None);

        let queue = vec![pending(5, 2, 1), pending(4, 1, 3)];
        assert_eq!(check_queue(&queue, 1).unwrap(), Some(4));
        assert!(matches!(check_queue(&queue, 2), Err(AppError::ItemNotAvailable(_))));
        assert!(check_queue(&queue, 3).is_err());
    }

    #[test]
    fn test_renewal_rules() {
        let now = Utc::now();
        assert!(check_renewal(&loan(3, 0), now, 2, false).is_ok());
        assert!(check_renewal(&loan(3, 2), now, 2, false).is_err());
        assert!(check_renewal(&loan(-1, 0), now, 2, false).is_err());
        assert!(check_renewal(&loan(3, 0), now, 2, true).is_err());

        let mut returned = loan(3, 0);
        returned.status = LoanStatus::Returned;
        returned.return_date = Some(now);
        assert!(matches!(
            check_renewal(&returned, now, 2, false),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_renewal_extends_from_later_date() {
        let now = Utc::now();
        let early = loan(3, 0);
        assert_eq!(renewed_due_date(early.due_date, now, 14), early.due_date + Duration::days(14));
    }
}
