//! Loan read service. Every loan leaves here with its derived status.

use crate::{
    error::AppResult,
    models::loan::{Loan, LoanDetails, LoanQuery},
    repository::Repository,
};

use super::today;

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
}

impl LoansService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get a loan row, with `overdue` derived from today's date
    pub async fn get_loan(&self, id: i32) -> AppResult<Loan> {
        let loan = self.repository.loans.get_by_id(id).await?;
        Ok(loan.observed(today()))
    }

    /// Get a loan joined with its member and book
    pub async fn get_loan_details(&self, id: i32) -> AppResult<LoanDetails> {
        self.repository.queries.loan_details(id, today()).await
    }

    /// List loans filtered on derived status, member or book
    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.queries.loans(query, today()).await
    }
}
