//! Business logic services

pub mod auth;
pub mod catalog;
pub mod email;
pub mod loans;
pub mod redis;
pub mod reports;
pub mod reservations;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub reservations: reservations::ReservationsService,
    pub loans: loans::LoansService,
    pub reports: reports::ReportsService,
    pub email: email::EmailService,
    pub redis: redis::RedisService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, redis_service: redis::RedisService) -> Self {
        let email = email::EmailService::new(config.email.clone());

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone(), redis_service.clone()),
            users: users::UsersService::new(
                repository.clone(),
                email.clone(),
                config.server.public_url.clone(),
                config.storage.clone(),
            ),
            catalog: catalog::CatalogService::new(repository.clone()),
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                config.reservations.clone(),
            ),
            loans: loans::LoansService::new(repository.clone(), config.reservations.clone()),
            reports: reports::ReportsService::new(repository.clone()),
            email,
            redis: redis_service,
            repository,
        }
    }
}
