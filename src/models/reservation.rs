//! Reservation model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::enums::ReservationStatus;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub item_id: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Loan created when the reservation was fulfilled
    pub loan_id: Option<i32>,
}

impl Reservation {
    /// Pending past its expiry; treated as EXPIRED even before the sweep runs
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at < now
    }

    /// Status as of `now`, counting an elapsed hold as EXPIRED
    pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
        if self.is_elapsed(now) {
            ReservationStatus::Expired
        } else {
            self.status
        }
    }

    pub fn check_transition(&self, next: ReservationStatus, now: DateTime<Utc>) -> AppResult<()> {
        let current = self.effective_status(now);
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "Reservation {} is {} and cannot become {}",
                self.id, current, next
            )))
        }
    }
}

/// Reservation with item/user names and its place in the item queue
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReservationDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reservation: Reservation,
    pub item_title: String,
    pub unique_item_id: String,
    pub user_name: String,
    /// 1-based position among pending reservations for the item
    pub queue_position: Option<i64>,
}

/// Reservation request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReservation {
    pub item_id: i32,
}

/// Approve request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApproveReservation {
    /// Skip the first-come-first-served check
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub status: Option<ReservationStatus>,
    pub user_id: Option<i32>,
    pub item_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Head of the pending queue for an item, oldest first
pub fn queue_head(pending: &[Reservation]) -> Option<&Reservation> {
    pending
        .iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .min_by_key(|r| (r.created_at, r.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(id: i32, user_id: i32, age_hours: i64, status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id,
            user_id,
            item_id: 1,
            status,
            created_at: now - Duration::hours(age_hours),
            expires_at: now + Duration::days(7) - Duration::hours(age_hours),
            loan_id: None,
        }
    }

    #[test]
    fn test_queue_head_is_oldest_pending() {
        let queue = vec![
            reservation(1, 10, 48, ReservationStatus::Cancelled),
            reservation(2, 11, 24, ReservationStatus::Pending),
            reservation(3, 12, 36, ReservationStatus::Pending),
        ];
        assert_eq!(queue_head(&queue).map(|r| r.id), Some(3));
        assert!(queue_head(&[]).is_none());
    }

    #[test]
    fn test_elapsed_only_applies_to_pending() {
        let mut r = reservation(1, 1, 24 * 8, ReservationStatus::Pending);
        assert!(r.is_elapsed(Utc::now()));
        r.status = ReservationStatus::Fulfilled;
        assert!(!r.is_elapsed(Utc::now()));
    }

    #[test]
    fn test_elapsed_reservation_cannot_be_fulfilled() {
        let now = Utc::now();
        let fresh = reservation(1, 1, 1, ReservationStatus::Pending);
        assert!(fresh.check_transition(ReservationStatus::Fulfilled, now).is_ok());
        assert!(fresh.check_transition(ReservationStatus::Cancelled, now).is_ok());

        let stale = reservation(2, 1, 24 * 8, ReservationStatus::Pending);
        assert_eq!(stale.effective_status(now), ReservationStatus::Expired);
        assert!(matches!(
            stale.check_transition(ReservationStatus::Fulfilled, now),
            Err(AppError::InvalidTransition(_))
        ));

        let cancelled = reservation(3, 1, 1, ReservationStatus::Cancelled);
        assert!(cancelled.check_transition(ReservationStatus::Fulfilled, now).is_err());
        assert!(cancelled.check_transition(ReservationStatus::Cancelled, now).is_err());
    }
}
