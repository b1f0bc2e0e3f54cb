//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, fines, health, items, loans, reservations, stats, users};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Librarium API",
        version = "1.0.0",
        description = "Library circulation REST API: catalog, loans, reservations and fines"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::verify_email,
        auth::resend_otp,
        auth::login,
        auth::refresh_token,
        auth::logout,
        auth::forgot_password,
        auth::reset_password,
        auth::me,
        // Users
        users::list_users,
        users::get_user,
        users::update_my_profile,
        users::update_role,
        users::update_status,
        users::approve_user,
        // Items
        items::list_items,
        items::get_item,
        items::create_item,
        items::update_item,
        items::delete_item,
        items::list_categories,
        items::create_category,
        // Loans
        loans::create_loan,
        loans::return_loan,
        loans::renew_loan,
        loans::my_loans,
        loans::get_user_loans,
        loans::list_loans,
        loans::get_loan,
        loans::overdue_loans,
        // Reservations
        reservations::create_reservation,
        reservations::my_reservations,
        reservations::list_reservations,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::approve_reservation,
        reservations::expire_reservations,
        // Fines
        fines::calculate_overdue,
        fines::create_fine,
        fines::my_fines,
        fines::list_fines,
        fines::get_fine,
        fines::pay_fine,
        fines::waive_fine,
        fines::delete_fine,
        fines::send_reminder,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Enums
            crate::models::enums::Role,
            crate::models::enums::ItemType,
            crate::models::enums::ItemStatus,
            crate::models::enums::LoanStatus,
            crate::models::enums::ReservationStatus,
            crate::models::enums::FineStatus,
            // Auth
            auth::RegisterRequest,
            auth::VerifyEmailRequest,
            auth::EmailRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RefreshRequest,
            auth::ResetPasswordRequest,
            auth::MessageResponse,
            crate::services::auth::TokenPair,
            // Users
            crate::models::user::User,
            crate::models::user::UserQuery,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRole,
            crate::models::user::UpdateStatus,
            // Items
            crate::models::item::LibraryItem,
            crate::models::item::ItemQuery,
            crate::models::item::CreateItem,
            crate::models::item::UpdateItem,
            crate::models::category::Category,
            crate::models::category::CreateCategory,
            // Loans
            loans::CreateLoanRequest,
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanQuery,
            // Reservations
            reservations::ExpireResponse,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::CreateReservation,
            crate::models::reservation::ApproveReservation,
            crate::models::reservation::ReservationQuery,
            // Fines
            fines::ReminderResponse,
            crate::models::fine::Fine,
            crate::models::fine::FineDetails,
            crate::models::fine::CreateFine,
            crate::models::fine::WaiveFine,
            crate::models::fine::FineQuery,
            crate::models::fine::FineTotals,
            crate::models::fine::UserFines,
            crate::models::fine::OverdueCalculation,
            // Stats
            stats::StatsResponse,
            stats::ItemStats,
            stats::UserStats,
            stats::LoanStats,
            stats::ReservationStats,
            stats::FineStats,
            stats::StatEntry,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, verification and tokens"),
        (name = "users", description = "User management"),
        (name = "items", description = "Catalog items and categories"),
        (name = "loans", description = "Checkout, return and renewal"),
        (name = "reservations", description = "Holds and fulfillment"),
        (name = "fines", description = "Overdue fines and payments"),
        (name = "stats", description = "Dashboard statistics")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_circulation_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/fines/calculate-overdue", "/reservations/{id}/approve", "/loans/{id}/renew"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
