//! Reservation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::reservation::{ApproveReservation, CreateReservation, ReservationDetails, ReservationQuery},
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

#[derive(Serialize, ToSchema)]
pub struct ExpireResponse {
    /// Reservations moved to EXPIRED by this call
    pub expired: u64,
}

/// Reserve an item
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation placed", body = ReservationDetails),
        (status = 403, description = "Account not verified"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Already reserved or borrowed by caller, or item lost")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    let reservation = state
        .services
        .reservations
        .create(claims.user_id, request.item_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Get the caller's reservations
#[utoipa::path(
    get,
    path = "/reservations/my",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's reservations, pending first", body = Vec<ReservationDetails>)
    )
)]
pub async fn my_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    let reservations = state
        .services
        .reservations
        .get_user_reservations(claims.user_id)
        .await?;
    Ok(Json(reservations))
}

/// List reservations (staff)
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Reservations in queue order", body = PaginatedResponse<ReservationDetails>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<PaginatedResponse<ReservationDetails>>> {
    claims.require_staff()?;

    let (reservations, total) = state.services.reservations.list(&query).await?;
    Ok(Json(PaginatedResponse::new(reservations, total, query.page, query.per_page)))
}

/// Get a reservation by ID
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get(&claims, id).await?;
    Ok(Json(reservation))
}

/// Cancel a pending reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 409, description = "Reservation is no longer pending")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.cancel(&claims, id).await?;
    Ok(Json(reservation))
}

/// Approve a reservation, checking the item out to its holder (staff)
#[utoipa::path(
    post,
    path = "/reservations/{id}/approve",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body(content = ApproveReservation, description = "Optional; `force` skips the queue order check"),
    responses(
        (status = 200, description = "Reservation fulfilled", body = ReservationDetails),
        (status = 409, description = "Not pending, expired, or item unavailable"),
        (status = 422, description = "Another reservation is ahead in the queue, or borrower limits reached")
    )
)]
pub async fn approve_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    body: Option<Json<ApproveReservation>>,
) -> AppResult<Json<ReservationDetails>> {
    claims.require_staff()?;

    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    let reservation = state
        .services
        .reservations
        .approve(claims.user_id, id, force)
        .await?;
    Ok(Json(reservation))
}

/// Expire elapsed reservations now (staff)
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Number of reservations expired", body = ExpireResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn expire_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ExpireResponse>> {
    claims.require_staff()?;

    let expired = state.services.reservations.expire_stale().await?;
    Ok(Json(ExpireResponse { expired }))
}
