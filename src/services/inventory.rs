//! Inventory coordinator.
//!
//! The only writer of `books.available_copies`. Every operation here runs as
//! one transaction: it re-reads the rows it is about to change under row
//! locks, applies the stock change through the catalog store's guarded
//! adjustment, writes the loan ledger, and commits. Dropping the transaction
//! on any error rolls everything back.
//!
//! Lock order is the loan row first, then book rows by ascending id, then
//! member rows. Checkouts never lock an existing loan, so no two operations
//! can wait on each other in a cycle.

use chrono::NaiveDate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, CreateBook, StockReport, UpdateBook},
        loan::{Loan, UpdateLoan},
    },
    repository::Repository,
};

use super::{retry::RetryPolicy, today};

#[derive(Clone)]
pub struct InventoryCoordinator {
    repository: Repository,
    retry: RetryPolicy,
}

impl InventoryCoordinator {
    pub fn new(repository: Repository, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }

    /// Lend one copy of `book_id` to `member_id`
    pub async fn checkout(
        &self,
        member_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        due_date: NaiveDate,
    ) -> AppResult<Loan> {
        if due_date < loan_date {
            return Err(AppError::Validation(
                "Due date cannot precede loan date".to_string(),
            ));
        }
        self.retry
            .run("checkout", || self.checkout_once(member_id, book_id, loan_date, due_date))
            .await
    }

    async fn checkout_once(
        &self,
        member_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        due_date: NaiveDate,
    ) -> AppResult<Loan> {
        let mut tx = self.repository.begin().await?;

        let book = self.repository.books.lock(&mut tx, book_id).await?;
        self.repository.members.lock_shared(&mut tx, member_id).await?;

        if book.available_copies <= 0 {
            return Err(AppError::OutOfStock(format!(
                "No copy of \"{}\" is available for loan",
                book.title
            )));
        }

        let book = self
            .repository
            .books
            .adjust_available_copies(&mut tx, book_id, -1)
            .await?;
        let loan = self
            .repository
            .loans
            .create(&mut tx, member_id, book_id, loan_date, due_date)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Checkout: loan {} of book {} to member {} ({}/{} copies left)",
            loan.id,
            book_id,
            member_id,
            book.available_copies,
            book.total_copies
        );
        Ok(loan)
    }

    /// Close a loan and put its copy back on the shelf
    pub async fn return_book(&self, loan_id: i32) -> AppResult<Loan> {
        self.retry
            .run("return", || self.return_book_once(loan_id))
            .await
    }

    async fn return_book_once(&self, loan_id: i32) -> AppResult<Loan> {
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, loan_id).await?;
        loan.status.ensure_returnable(loan_id)?;

        self.repository.books.lock(&mut tx, loan.book_id).await?;
        let book = self
            .repository
            .books
            .adjust_available_copies(&mut tx, loan.book_id, 1)
            .await?;
        let returned = self
            .repository
            .loans
            .mark_returned(&mut tx, loan_id, today())
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Return: loan {} closed, book {} back to {}/{} copies",
            loan_id,
            book.id,
            book.available_copies,
            book.total_copies
        );
        Ok(returned)
    }

    /// Delete a loan in any state. A loan that still holds a copy gives it
    /// back first. The loan row lock serializes concurrent deletes: the
    /// second caller finds no row and gets `NotFound`.
    pub async fn delete_loan_guarded(&self, loan_id: i32) -> AppResult<()> {
        self.retry
            .run("delete loan", || self.delete_loan_once(loan_id))
            .await
    }

    async fn delete_loan_once(&self, loan_id: i32) -> AppResult<()> {
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, loan_id).await?;
        if loan.holds_copy() {
            self.repository.books.lock(&mut tx, loan.book_id).await?;
            self.repository
                .books
                .adjust_available_copies(&mut tx, loan.book_id, 1)
                .await?;
        }
        self.repository.loans.delete(&mut tx, loan_id).await?;

        tx.commit().await?;

        if loan.holds_copy() {
            tracing::warn!(
                "Loan {} deleted while holding a copy; book {} copy reclaimed",
                loan_id,
                loan.book_id
            );
        } else {
            tracing::info!("Loan {} deleted", loan_id);
        }
        Ok(())
    }

    /// Administrative correction of a loan.
    ///
    /// Any field may change, including the status in either direction. Stock
    /// follows the edit: the copy held before the edit is released, and the
    /// copy held after it is taken, with `OutOfStock` when none is left.
    pub async fn update_loan(&self, loan_id: i32, fields: &UpdateLoan) -> AppResult<Loan> {
        self.retry
            .run("update loan", || self.update_loan_once(loan_id, fields))
            .await
    }

    async fn update_loan_once(&self, loan_id: i32, fields: &UpdateLoan) -> AppResult<Loan> {
        let mut tx = self.repository.begin().await?;

        let loan = self.repository.loans.lock(&mut tx, loan_id).await?;

        let mut book_ids = vec![loan.book_id, fields.book_id];
        book_ids.sort_unstable();
        book_ids.dedup();
        for id in &book_ids {
            self.repository.books.lock(&mut tx, *id).await?;
        }
        self.repository.members.lock_shared(&mut tx, fields.member_id).await?;

        let will_hold = fields.status.holds_copy();

        if loan.holds_copy() {
            self.repository
                .books
                .adjust_available_copies(&mut tx, loan.book_id, 1)
                .await?;
        }
        if will_hold {
            let target = self.repository.books.lock(&mut tx, fields.book_id).await?;
            if target.available_copies <= 0 {
                return Err(AppError::OutOfStock(format!(
                    "No copy of \"{}\" is available for loan",
                    target.title
                )));
            }
            self.repository
                .books
                .adjust_available_copies(&mut tx, fields.book_id, -1)
                .await?;
        }

        let return_date = if will_hold {
            None
        } else {
            Some(fields.return_date.or(loan.return_date).unwrap_or_else(today))
        };

        let updated = self
            .repository
            .loans
            .update_fields(&mut tx, loan_id, fields, return_date, fields.fine_or_zero())
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Loan {} updated: book {} -> {}, status {} -> {}",
            loan_id,
            loan.book_id,
            updated.book_id,
            loan.status,
            updated.status
        );
        Ok(updated)
    }

    /// Register a new book and its category tags
    pub async fn create_book(&self, book: &CreateBook) -> AppResult<Book> {
        self.retry
            .run("create book", || self.create_book_once(book))
            .await
    }

    async fn create_book_once(&self, book: &CreateBook) -> AppResult<Book> {
        let mut tx = self.repository.begin().await?;

        let created = self.repository.books.create(&mut tx, book).await?;
        if !book.category_ids.is_empty() {
            self.repository
                .books
                .set_categories(&mut tx, created.id, &book.category_ids)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Book {} created with {} copies",
            created.id,
            created.total_copies
        );
        Ok(created)
    }

    /// Edit a book. A new `total_copies` shifts the available count by the
    /// same amount; copies on loan are never written off.
    pub async fn update_book(&self, book_id: i32, fields: &UpdateBook) -> AppResult<Book> {
        self.retry
            .run("update book", || self.update_book_once(book_id, fields))
            .await
    }

    async fn update_book_once(&self, book_id: i32, fields: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.repository.begin().await?;

        let book = self.repository.books.lock(&mut tx, book_id).await?;
        let (total, available) = match fields.total_copies {
            Some(total) => (total, book.resized_available(total)?),
            None => (book.total_copies, book.available_copies),
        };

        let updated = self
            .repository
            .books
            .update(&mut tx, book_id, fields, total, available)
            .await?;
        if let Some(ref category_ids) = fields.category_ids {
            self.repository
                .books
                .set_categories(&mut tx, book_id, category_ids)
                .await?;
        }

        tx.commit().await?;

        if updated.total_copies != book.total_copies {
            tracing::info!(
                "Book {} resized from {} to {} copies ({} available)",
                book_id,
                book.total_copies,
                updated.total_copies,
                updated.available_copies
            );
        }
        Ok(updated)
    }

    /// Delete a book no loan has ever referenced
    pub async fn delete_book_guarded(&self, book_id: i32) -> AppResult<()> {
        self.retry
            .run("delete book", || self.delete_book_once(book_id))
            .await
    }

    async fn delete_book_once(&self, book_id: i32) -> AppResult<()> {
        let mut tx = self.repository.begin().await?;

        self.repository.books.lock(&mut tx, book_id).await?;
        self.repository.books.delete(&mut tx, book_id).await?;

        tx.commit().await?;

        tracing::info!("Book {} deleted", book_id);
        Ok(())
    }

    /// Delete a member with no loan history
    pub async fn delete_member_guarded(&self, member_id: i32) -> AppResult<()> {
        self.retry
            .run("delete member", || self.delete_member_once(member_id))
            .await
    }

    async fn delete_member_once(&self, member_id: i32) -> AppResult<()> {
        let mut tx = self.repository.begin().await?;

        self.repository.members.lock(&mut tx, member_id).await?;
        self.repository.members.delete(&mut tx, member_id).await?;

        tx.commit().await?;

        tracing::info!("Member {} deleted", member_id);
        Ok(())
    }

    /// Compare one book's counter with its holding loans
    pub async fn audit_stock(&self, book_id: i32) -> AppResult<StockReport> {
        let report = self.repository.queries.stock_report(book_id).await?;
        if !report.consistent {
            tracing::error!(
                "Stock drift on book {}: {} available, {} total, {} on loan",
                book_id,
                report.available_copies,
                report.total_copies,
                report.copies_on_loan
            );
        }
        Ok(report)
    }

    /// Audit every book
    pub async fn audit_all(&self) -> AppResult<Vec<StockReport>> {
        let reports = self.repository.queries.stock_reports().await?;
        let drifted = reports.iter().filter(|r| !r.consistent).count();
        if drifted > 0 {
            tracing::error!("Stock audit: {} of {} books drifted", drifted, reports.len());
        } else {
            tracing::debug!("Stock audit: {} books consistent", reports.len());
        }
        Ok(reports)
    }
}
