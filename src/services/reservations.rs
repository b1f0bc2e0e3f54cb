//! Reservations service: holds, queue ordering and fulfillment into loans

use chrono::{Duration, Utc};

use super::{
    email::EmailService,
    loans::{check_borrower, BorrowerStanding},
};
use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        enums::{ItemStatus, ReservationStatus},
        loan::due_date_from,
        reservation::{queue_head, Reservation, ReservationDetails, ReservationQuery},
        user::UserClaims,
    },
    repository::Repository,
};

/// The approved reservation must head its item's queue unless forced
pub fn check_fulfillment_order(pending: &[Reservation], reservation_id: i32, force: bool) -> AppResult<()> {
    if force {
        return Ok(());
    }
    match queue_head(pending) {
        Some(head) if head.id == reservation_id => Ok(()),
        Some(head) => Err(AppError::BusinessRule(format!(
            "Reservation {} is ahead in the queue for this item",
            head.id
        ))),
        None => Err(AppError::InvalidTransition(format!(
            "Reservation {} is no longer pending",
            reservation_id
        ))),
    }
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    rules: CirculationConfig,
    email: EmailService,
}

impl ReservationsService {
    pub fn new(repository: Repository, rules: CirculationConfig, email: EmailService) -> Self {
        Self {
            repository,
            rules,
            email,
        }
    }

    /// Expire elapsed PENDING reservations; returns how many changed
    pub async fn expire_stale(&self) -> AppResult<u64> {
        let expired = self.repository.reservations.expire_stale(Utc::now()).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale reservations");
        }
        Ok(expired)
    }

    pub async fn get(&self, actor: &UserClaims, id: i32) -> AppResult<ReservationDetails> {
        self.expire_stale().await?;
        let details = self.repository.reservations.get_details(id).await?;
        actor.require_self_or_staff(details.reservation.user_id)?;
        Ok(details)
    }

    pub async fn get_user_reservations(&self, user_id: i32) -> AppResult<Vec<ReservationDetails>> {
        self.expire_stale().await?;
        self.repository.reservations.get_user_reservations(user_id).await
    }

    pub async fn list(&self, query: &ReservationQuery) -> AppResult<(Vec<ReservationDetails>, i64)> {
        self.expire_stale().await?;
        self.repository.reservations.list(query).await
    }

    /// Place a hold on an item
    pub async fn create(&self, user_id: i32, item_id: i32) -> AppResult<ReservationDetails> {
        self.expire_stale().await?;

        let user = self.repository.users.get_by_id(user_id).await?;
        if !user.is_active {
            return Err(AppError::Authorization("Account is deactivated".to_string()));
        }
        if !user.is_verified {
            return Err(AppError::NotVerified("Account email is not verified".to_string()));
        }

        let item = self.repository.items.get_by_id(item_id).await?;
        if item.status == ItemStatus::Lost {
            return Err(AppError::ItemNotAvailable(format!(
                "Item {} is lost and cannot be reserved",
                item.unique_item_id
            )));
        }

        if self.repository.loans.user_holds_item(user_id, item_id).await? {
            return Err(AppError::Conflict("You already have this item on loan".to_string()));
        }

        let expires_at = Utc::now() + Duration::days(self.rules.reservation_expiry_days);
        let reservation = self
            .repository
            .reservations
            .create(user_id, item_id, expires_at)
            .await?;

        tracing::info!(reservation_id = reservation.id, user_id, item_id, "Reservation placed");
        self.repository.reservations.get_details(reservation.id).await
    }

    /// Withdraw a pending reservation (owner or staff)
    pub async fn cancel(&self, actor: &UserClaims, id: i32) -> AppResult<ReservationDetails> {
        self.expire_stale().await?;

        let mut tx = self.repository.begin().await?;
        let reservation = self.repository.reservations.lock_for_update(&mut tx, id).await?;
        actor.require_self_or_staff(reservation.user_id)?;
        reservation.check_transition(ReservationStatus::Cancelled, Utc::now())?;

        self.repository
            .reservations
            .transition(&mut tx, id, ReservationStatus::Cancelled, None)
            .await?;
        tx.commit().await?;

        tracing::info!(reservation_id = id, actor_id = actor.user_id, "Reservation cancelled");
        self.repository.reservations.get_details(id).await
    }

    /// Turn a pending reservation into a loan
    pub async fn approve(&self, actor_id: i32, id: i32, force: bool) -> AppResult<ReservationDetails> {
        let now = Utc::now();
        self.expire_stale().await?;

        // lock order matches checkout: user, item, then reservation
        let unlocked = self.repository.reservations.get_by_id(id).await?;
        let mut tx = self.repository.begin().await?;

        let borrower = self.repository.users.lock_for_update(&mut tx, unlocked.user_id).await?;
        let item = self.repository.items.lock_for_update(&mut tx, unlocked.item_id).await?;
        let reservation = self.repository.reservations.lock_for_update(&mut tx, id).await?;

        reservation.check_transition(ReservationStatus::Fulfilled, now)?;

        if !item.is_available() {
            return Err(AppError::ItemNotAvailable(format!(
                "Item {} is {}",
                item.unique_item_id, item.status
            )));
        }

        let pending = self
            .repository
            .reservations
            .pending_for_item(&mut tx, reservation.item_id)
            .await?;
        check_fulfillment_order(&pending, reservation.id, force)?;

        let standing = BorrowerStanding {
            is_active: borrower.is_active,
            is_verified: borrower.is_verified,
            active_loans: self
                .repository
                .loans
                .count_active_for_user(&mut tx, borrower.id)
                .await?,
            pending_fines: self
                .repository
                .fines
                .pending_total_for_user(&mut tx, borrower.id)
                .await?,
        };
        check_borrower(&standing, &self.rules)?;

        let due_date = due_date_from(now, self.rules.loan_period_days);
        let loan = self
            .repository
            .loans
            .create(&mut tx, borrower.id, item.id, now, due_date)
            .await?;
        self.repository.items.set_status(&mut tx, item.id, ItemStatus::Borrowed).await?;
        self.repository
            .reservations
            .transition(&mut tx, id, ReservationStatus::Fulfilled, Some(loan.id))
            .await?;

        tx.commit().await?;

        tracing::info!(
            reservation_id = id,
            loan_id = loan.id,
            actor_id,
            forced = force,
            "Reservation fulfilled"
        );

        if let Err(e) = self
            .email
            .send_reservation_fulfilled(&borrower.email, &borrower.name, &item.title, due_date)
            .await
        {
            tracing::warn!(reservation_id = id, "Failed to send reservation notice: {}", e);
        }

        self.repository.reservations.get_details(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: i32, age_hours: i64) -> Reservation {
        let now = Utc::now();
        Reservation {
            id,
            user_id: id * 10,
            item_id: 1,
            status: ReservationStatus::Pending,
            created_at: now - Duration::hours(age_hours),
            expires_at: now + Duration::days(7),
            loan_id: None,
        }
    }

    #[test]
    fn test_first_come_first_served() {
        let queue = vec![pending(2, 1), pending(1, 5), pending(3, 0)];
        assert!(check_fulfillment_order(&queue, 1, false).is_ok());
        assert!(matches!(
            check_fulfillment_order(&queue, 2, false),
            Err(AppError::BusinessRule(_))
        ));
        assert!(check_fulfillment_order(&queue, 3, true).is_ok());
    }

    #[test]
    fn test_same_timestamp_breaks_ties_by_id() {
        let mut a = pending(7, 2);
        let mut b = pending(4, 2);
        b.created_at = a.created_at;
        a.user_id = 1;
        let queue = vec![a, b];
        assert!(check_fulfillment_order(&queue, 4, false).is_ok());
        assert!(check_fulfillment_order(&queue, 7, false).is_err());
    }

    #[test]
    fn test_empty_queue_means_no_longer_pending() {
        assert!(matches!(
            check_fulfillment_order(&[], 1, false),
            Err(AppError::InvalidTransition(_))
        ));
    }
}
