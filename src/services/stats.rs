//! Statistics service for the staff dashboard

use crate::{
    api::stats::{FineStats, ItemStats, LoanStats, ReservationStats, StatEntry, StatsResponse, UserStats},
    error::AppResult,
    repository::Repository,
};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

fn entries<T: ToString>(rows: Vec<(T, i64)>) -> (i64, Vec<StatEntry>) {
    let total = rows.iter().map(|(_, n)| n).sum();
    let entries = rows
        .into_iter()
        .map(|(label, value)| StatEntry {
            label: label.to_string(),
            value,
        })
        .collect();
    (total, entries)
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Snapshot of catalog, circulation and fine figures
    pub async fn get_stats(&self) -> AppResult<StatsResponse> {
        // Pending counts are only meaningful once elapsed holds are gone
        self.repository.reservations.expire_stale(chrono::Utc::now()).await?;

        let (items_total, by_status) = entries(self.repository.items.count_by_status().await?);
        let (users_total, by_role) = entries(self.repository.users.count_by_role().await?);
        let (pending_count, pending_total) = self.repository.fines.pending_summary().await?;

        Ok(StatsResponse {
            items: ItemStats {
                total: items_total,
                by_status,
            },
            users: UserStats {
                total: users_total,
                by_role,
            },
            loans: LoanStats {
                active: self.repository.loans.count_active().await?,
                overdue: self.repository.loans.count_overdue().await?,
            },
            reservations: ReservationStats {
                pending: self.repository.reservations.count_pending().await?,
            },
            fines: FineStats {
                pending_count,
                pending_total,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ItemStatus;

    #[test]
    fn test_entries_sum_and_label() {
        let (total, list) = entries(vec![(ItemStatus::Available, 4), (ItemStatus::Lost, 1)]);
        assert_eq!(total, 5);
        assert_eq!(list[0].label, "AVAILABLE");
        assert_eq!(list[1].value, 1);
    }
}
