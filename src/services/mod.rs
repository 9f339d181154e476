//! Business logic services

pub mod catalog;
pub mod inventory;
pub mod loans;
pub mod members;
pub mod retry;

use chrono::{NaiveDate, Utc};

use crate::{
    config::AppConfig,
    error::AppResult,
    models::{Book, Loan, Member},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub inventory: inventory::InventoryCoordinator,
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub loans: loans::LoansService,
    /// Loan length applied when a checkout omits its due date
    pub default_loan_days: u32,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let retry = retry::RetryPolicy::from_config(&config.inventory);
        Self {
            inventory: inventory::InventoryCoordinator::new(repository.clone(), retry),
            catalog: catalog::CatalogService::new(repository.clone()),
            members: members::MembersService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone()),
            default_loan_days: config.loans.default_duration_days,
            repository,
        }
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.catalog.get_book(id).await
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.members.get_member(id).await
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<Loan> {
        self.loans.get_loan(id).await
    }

    /// Database reachability, for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}

/// Calendar date used for return dates and overdue derivation
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
