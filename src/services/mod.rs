//! Business logic services

pub mod catalog;
pub mod loans;
pub mod reviews;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
    pub reviews: reviews::ReviewsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(
                repository.clone(),
                config.search.clone(),
                config.catalog.clone(),
            ),
            loans: loans::LoansService::new(repository.clone(), config.loans.duration_days),
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            reviews: reviews::ReviewsService::new(repository.clone()),
            repository,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Check that storage answers
    pub async fn ready(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
