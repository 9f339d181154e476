//! Loan ledger: loan rows and their lifecycle transitions

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanStatus, UpdateLoan},
};

const LOAN_COLUMNS: &str =
    "id, member_id, book_id, loan_date, due_date, return_date, status, fine, created_at";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID (stored status)
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Re-read a loan under a row lock; this is the serialization point for
    /// every transition of that loan.
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Insert a loan; its status is always `borrowed`
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        member_id: i32,
        book_id: i32,
        loan_date: NaiveDate,
        due_date: NaiveDate,
    ) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (member_id, book_id, loan_date, due_date, status, fine)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(member_id)
        .bind(book_id)
        .bind(loan_date)
        .bind(due_date)
        .bind(LoanStatus::Borrowed)
        .fetch_one(&mut *conn)
        .await?;

        Ok(loan)
    }

    /// Close a loan. Fails with `AlreadyReturned` when it is closed already.
    pub async fn mark_returned(
        &self,
        conn: &mut PgConnection,
        id: i32,
        return_date: NaiveDate,
    ) -> AppResult<Loan> {
        let updated = sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET status = $2, return_date = $3
            WHERE id = $1 AND status <> $2
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(LoanStatus::Returned)
        .bind(return_date)
        .fetch_optional(&mut *conn)
        .await?;

        match updated {
            Some(loan) => Ok(loan),
            None => {
                let current = self.lock(conn, id).await?;
                current.status.ensure_returnable(id)?;
                Err(AppError::Internal(format!("Loan {} could not be closed", id)))
            }
        }
    }

    /// Overwrite the editable fields of a loan. No transition check: callers
    /// decide what the edit means for stock.
    pub async fn update_fields(
        &self,
        conn: &mut PgConnection,
        id: i32,
        fields: &UpdateLoan,
        return_date: Option<NaiveDate>,
        fine: Decimal,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            r#"
            UPDATE loans SET
                member_id = $2,
                book_id = $3,
                loan_date = $4,
                due_date = $5,
                return_date = $6,
                status = $7,
                fine = $8
            WHERE id = $1
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(id)
        .bind(fields.member_id)
        .bind(fields.book_id)
        .bind(fields.loan_date)
        .bind(fields.due_date)
        .bind(return_date)
        .bind(fields.status)
        .bind(fine)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Delete a loan row
    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Loan with id {} not found", id))
}
