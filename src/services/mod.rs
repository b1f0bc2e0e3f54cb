//! Business logic services

pub mod auth;
pub mod catalog;
pub mod email;
pub mod fines;
pub mod loans;
pub mod otp;
pub mod redis;
pub mod reservations;
pub mod stats;
pub mod token_store;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};
use token_store::TokenStore;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub fines: fines::FinesService,
    pub stats: stats::StatsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository and token store
    pub fn new(repository: Repository, config: &AppConfig, store: Arc<dyn TokenStore>) -> Self {
        let email = email::EmailService::new(config.email.clone());
        let rules = config.circulation.clone();

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone(), store, email.clone()),
            users: users::UsersService::new(repository.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), rules.clone()),
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                rules.clone(),
                email.clone(),
            ),
            fines: fines::FinesService::new(repository.clone(), rules, email),
            stats: stats::StatsService::new(repository.clone()),
            repository,
        }
    }

    /// Database round-trip for readiness probes
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
