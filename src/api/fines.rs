//! Fine endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::fine::{CreateFine, Fine, FineDetails, FineQuery, OverdueCalculation, UserFines, WaiveFine},
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

#[derive(Serialize, ToSchema)]
pub struct ReminderResponse {
    /// Whether the email went out
    pub sent: bool,
}

/// Fine every overdue loan that has none yet (staff)
#[utoipa::path(
    post,
    path = "/fines/calculate-overdue",
    tag = "fines",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fines created by this run", body = OverdueCalculation),
        (status = 403, description = "Staff only")
    )
)]
pub async fn calculate_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<OverdueCalculation>> {
    claims.require_staff()?;

    let result = state.services.fines.calculate_overdue(claims.user_id).await?;
    Ok(Json(result))
}

/// Issue a fine manually (staff)
#[utoipa::path(
    post,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = CreateFine,
    responses(
        (status = 201, description = "Fine created", body = Fine),
        (status = 400, description = "Invalid amount or loan of another user"),
        (status = 404, description = "User or loan not found"),
        (status = 409, description = "Loan already has an open fine")
    )
)]
pub async fn create_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateFine>,
) -> AppResult<(StatusCode, Json<Fine>)> {
    claims.require_staff()?;

    let fine = state.services.fines.create(claims.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(fine)))
}

/// Get the caller's fines with totals
#[utoipa::path(
    get,
    path = "/fines/my",
    tag = "fines",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's fines", body = UserFines)
    )
)]
pub async fn my_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserFines>> {
    let fines = state.services.fines.get_user_fines(claims.user_id).await?;
    Ok(Json(fines))
}

/// List fines (staff)
#[utoipa::path(
    get,
    path = "/fines",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(FineQuery),
    responses(
        (status = 200, description = "Fines", body = PaginatedResponse<FineDetails>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<FineQuery>,
) -> AppResult<Json<PaginatedResponse<FineDetails>>> {
    claims.require_staff()?;

    let (fines, total) = state.services.fines.list(&query).await?;
    Ok(Json(PaginatedResponse::new(fines, total, query.page, query.per_page)))
}

/// Get a fine by ID
#[utoipa::path(
    get,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine details", body = FineDetails),
        (status = 403, description = "Not your fine"),
        (status = 404, description = "Fine not found")
    )
)]
pub async fn get_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<FineDetails>> {
    let fine = state.services.fines.get(&claims, id).await?;
    Ok(Json(fine))
}

/// Record payment of a pending fine (staff)
#[utoipa::path(
    post,
    path = "/fines/{id}/pay",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Fine paid", body = Fine),
        (status = 404, description = "Fine not found"),
        (status = 409, description = "Fine already paid or waived")
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Fine>> {
    claims.require_staff()?;

    let fine = state.services.fines.pay(claims.user_id, id).await?;
    Ok(Json(fine))
}

/// Waive a pending fine (staff)
#[utoipa::path(
    post,
    path = "/fines/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    request_body(content = WaiveFine, description = "Optional waive reason"),
    responses(
        (status = 200, description = "Fine waived", body = Fine),
        (status = 404, description = "Fine not found"),
        (status = 409, description = "Fine already paid or waived")
    )
)]
pub async fn waive_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    body: Option<Json<WaiveFine>>,
) -> AppResult<Json<Fine>> {
    claims.require_staff()?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let fine = state.services.fines.waive(claims.user_id, id, &request).await?;
    Ok(Json(fine))
}

/// Delete a pending fine (admin)
#[utoipa::path(
    delete,
    path = "/fines/{id}",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 204, description = "Fine deleted"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Only pending fines can be deleted")
    )
)]
pub async fn delete_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.fines.delete(claims.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Email the fine's owner a reminder (staff)
#[utoipa::path(
    post,
    path = "/fines/{id}/remind",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Fine ID")
    ),
    responses(
        (status = 200, description = "Reminder attempted", body = ReminderResponse),
        (status = 404, description = "Fine not found"),
        (status = 409, description = "Fine is not pending")
    )
)]
pub async fn send_reminder(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReminderResponse>> {
    claims.require_staff()?;

    let sent = state.services.fines.send_reminder(id).await?;
    Ok(Json(ReminderResponse { sent }))
}
