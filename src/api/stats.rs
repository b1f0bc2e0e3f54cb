//! Statistics endpoints

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, AppState};

use super::AuthenticatedUser;

/// Dashboard statistics
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub items: ItemStats,
    pub users: UserStats,
    pub loans: LoanStats,
    pub reservations: ReservationStats,
    pub fines: FineStats,
}

#[derive(Serialize, ToSchema)]
pub struct ItemStats {
    /// Total number of items
    pub total: i64,
    /// Items per status
    pub by_status: Vec<StatEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct UserStats {
    /// Active accounts
    pub total: i64,
    /// Active accounts per role
    pub by_role: Vec<StatEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct LoanStats {
    /// Items currently out
    pub active: i64,
    /// Items out past their due date
    pub overdue: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ReservationStats {
    pub pending: i64,
}

#[derive(Serialize, ToSchema)]
pub struct FineStats {
    pub pending_count: i64,
    /// Sum of pending fines
    #[schema(value_type = String, example = "42.50")]
    pub pending_total: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct StatEntry {
    /// Label
    pub label: String,
    /// Value
    pub value: i64,
}

/// Get dashboard statistics
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library statistics", body = StatsResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    claims.require_staff()?;

    let stats = state.services.stats.get_stats().await?;
    Ok(Json(stats))
}
