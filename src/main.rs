//! Librarium Server - Library Circulation System
//!
//! REST API server for catalog, loans, reservations and fines.

use anyhow::Context;
use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use librarium_server::{
    api,
    config::{AppConfig, LoggingConfig, RateLimitConfig},
    repository::Repository,
    services::{
        redis::RedisService,
        token_store::{MemoryTokenStore, TokenStore},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Librarium Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let store = token_store(&config).await?;

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config, store);

    if let Some(admin) = services.users.ensure_admin(&config.admin).await? {
        tracing::info!(email = %admin.email, "Administrator account ready");
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state)?;

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("librarium_server={},tower_http=debug", logging.level).into());

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Redis when configured, otherwise an in-process store
async fn token_store(config: &AppConfig) -> anyhow::Result<Arc<dyn TokenStore>> {
    if let Some(ref url) = config.redis.url {
        let redis = RedisService::new(url).await.context("Failed to connect to Redis")?;
        tracing::info!("Connected to Redis");
        return Ok(Arc::new(redis));
    }

    tracing::warn!("No Redis URL configured; sessions and codes are kept in memory");
    let memory = MemoryTokenStore::new();
    let sweeper = memory.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.purge_expired().await;
        }
    });
    Ok(Arc::new(memory))
}

/// Per client IP limiter; requires the connect-info make service
fn rate_limited(
    router: Router<AppState>,
    config: &RateLimitConfig,
) -> anyhow::Result<Router<AppState>> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .finish()
        .context("Invalid rate limit configuration")?;

    Ok(router.layer(GovernorLayer {
        config: Box::leak(Box::new(governor_conf)),
    }))
}

/// Create the application router with all routes
fn create_router(state: AppState) -> anyhow::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Unauthenticated credential endpoints
    let auth_routes = rate_limited(
        Router::new()
            .route("/auth/register", post(api::auth::register))
            .route("/auth/verify-email", post(api::auth::verify_email))
            .route("/auth/resend-otp", post(api::auth::resend_otp))
            .route("/auth/login", post(api::auth::login))
            .route("/auth/refresh-token", post(api::auth::refresh_token))
            .route("/auth/forgot-password", post(api::auth::forgot_password))
            .route("/auth/reset-password", post(api::auth::reset_password)),
        &state.config.rate_limit,
    )?;

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Session
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        // Users
        .route("/users", get(api::users::list_users))
        .route("/users/profile", patch(api::users::update_my_profile))
        .route("/users/:id", get(api::users::get_user))
        .route("/users/:id/role", patch(api::users::update_role))
        .route("/users/:id/status", patch(api::users::update_status))
        .route("/users/:id/approve", post(api::users::approve_user))
        .route("/users/:id/loans", get(api::loans::get_user_loans))
        // Items (catalog)
        .route("/items", get(api::items::list_items).post(api::items::create_item))
        .route(
            "/items/:id",
            get(api::items::get_item)
                .put(api::items::update_item)
                .delete(api::items::delete_item),
        )
        .route(
            "/categories",
            get(api::items::list_categories).post(api::items::create_category),
        )
        // Loans
        .route("/loans", get(api::loans::list_loans).post(api::loans::create_loan))
        .route("/loans/my", get(api::loans::my_loans))
        .route("/loans/overdue", get(api::loans::overdue_loans))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .route("/loans/:id/renew", post(api::loans::renew_loan))
        // Reservations
        .route(
            "/reservations",
            get(api::reservations::list_reservations).post(api::reservations::create_reservation),
        )
        .route("/reservations/my", get(api::reservations::my_reservations))
        .route("/reservations/expire", post(api::reservations::expire_reservations))
        .route("/reservations/:id", get(api::reservations::get_reservation))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        .route("/reservations/:id/approve", post(api::reservations::approve_reservation))
        // Fines
        .route("/fines", get(api::fines::list_fines).post(api::fines::create_fine))
        .route("/fines/my", get(api::fines::my_fines))
        .route("/fines/calculate-overdue", post(api::fines::calculate_overdue))
        .route(
            "/fines/:id",
            get(api::fines::get_fine).delete(api::fines::delete_fine),
        )
        .route("/fines/:id/pay", post(api::fines::pay_fine))
        .route("/fines/:id/waive", post(api::fines::waive_fine))
        .route("/fines/:id/remind", post(api::fines::send_reminder))
        // Statistics
        .route("/stats", get(api::stats::get_stats))
        .merge(auth_routes)
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Ok(Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        ))
}
