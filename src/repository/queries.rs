//! Read-side joins for display.
//!
//! Nothing here takes a lock. A read that decides a write belongs in a
//! transaction through the store repositories, never here.

use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::{Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookQuery, StockReport},
        category::Category,
        loan::{LoanDetails, LoanDetailsRow, LoanQuery},
    },
};

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.member_id, l.book_id, l.loan_date, l.due_date, l.return_date,
           l.status, l.fine, l.created_at,
           m.name AS member_name, m.email AS member_email,
           b.title AS book_title, b.author AS book_author
    FROM loans l
    JOIN members m ON m.id = l.member_id
    JOIN books b ON b.id = l.book_id
"#;

/// Filter on the observed status: `$1` status, `$2` today, `$3` member, `$4` book
const LOAN_FILTER: &str = r#"
    WHERE ($1::loan_status IS NULL OR (
            CASE
                WHEN l.status = 'borrowed' AND l.return_date IS NULL AND l.due_date < $2
                    THEN 'overdue'::loan_status
                ELSE l.status
            END) = $1)
      AND ($3::int IS NULL OR l.member_id = $3)
      AND ($4::int IS NULL OR l.book_id = $4)
"#;

const STOCK_SELECT: &str = r#"
    SELECT b.id, b.title, b.author, b.publication_date, b.total_copies,
           b.available_copies, b.created_at,
           (SELECT COUNT(*) FROM loans l
             WHERE l.book_id = b.id AND l.status <> 'returned') AS copies_on_loan
    FROM books b
"#;

#[derive(Clone)]
pub struct QueryRepository {
    pool: Pool<Postgres>,
}

impl QueryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Page of books with their categories
    pub async fn books_with_categories(
        &self,
        query: &BookQuery,
    ) -> AppResult<(Vec<BookDetails>, i64)> {
        let (limit, offset) = query.limit_offset();

        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, publication_date, total_copies, available_copies, created_at
            FROM books
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        let mut tags = self.categories_for(&ids).await?;

        let details = books
            .into_iter()
            .map(|book| {
                let categories = tags.remove(&book.id).unwrap_or_default();
                BookDetails {
                    category_ids: categories.iter().map(|c| c.id).collect(),
                    categories,
                    book,
                }
            })
            .collect();

        Ok((details, total))
    }

    /// One book with its categories
    pub async fn book_with_categories(&self, id: i32) -> AppResult<BookDetails> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, publication_date, total_copies, available_copies, created_at
            FROM books WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        let categories = self.categories_for(&[id]).await?.remove(&id).unwrap_or_default();

        Ok(BookDetails {
            category_ids: categories.iter().map(|c| c.id).collect(),
            categories,
            book,
        })
    }

    async fn categories_for(&self, book_ids: &[i32]) -> AppResult<HashMap<i32, Vec<Category>>> {
        let mut map: HashMap<i32, Vec<Category>> = HashMap::new();
        if book_ids.is_empty() {
            return Ok(map);
        }

        let rows = sqlx::query(
            r#"
            SELECT bc.book_id, c.id, c.name, c.description
            FROM book_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE bc.book_id = ANY($1)
            ORDER BY c.name
            "#,
        )
        .bind(book_ids)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            map.entry(row.get("book_id")).or_default().push(Category {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
            });
        }

        Ok(map)
    }

    /// Loans joined with member and book, filtered on observed status
    pub async fn loans(
        &self,
        query: &LoanQuery,
        today: NaiveDate,
    ) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (limit, offset) = crate::models::book::page_window(query.page, query.per_page);

        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            "{} {} ORDER BY l.loan_date DESC, l.id DESC LIMIT $5 OFFSET $6",
            LOAN_DETAILS_SELECT, LOAN_FILTER
        ))
        .bind(query.status)
        .bind(today)
        .bind(query.member_id)
        .bind(query.book_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM loans l {}", LOAN_FILTER))
            .bind(query.status)
            .bind(today)
            .bind(query.member_id)
            .bind(query.book_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows.into_iter().map(|r| r.into_details(today)).collect(), total))
    }

    /// One loan with member and book
    pub async fn loan_details(&self, id: i32, today: NaiveDate) -> AppResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetailsRow>(&format!("{} WHERE l.id = $1", LOAN_DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_details(today))
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Every loan of a member, newest first
    pub async fn member_loans(&self, member_id: i32, today: NaiveDate) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query_as::<_, LoanDetailsRow>(&format!(
            "{} WHERE l.member_id = $1 ORDER BY l.loan_date DESC, l.id DESC",
            LOAN_DETAILS_SELECT
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_details(today)).collect())
    }

    /// Counter vs. loan rows for one book, read in a single statement
    pub async fn stock_report(&self, book_id: i32) -> AppResult<StockReport> {
        let row = sqlx::query(&format!("{} WHERE b.id = $1", STOCK_SELECT))
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        stock_report_from_row(&row)
    }

    /// Counter vs. loan rows for every book
    pub async fn stock_reports(&self) -> AppResult<Vec<StockReport>> {
        let rows = sqlx::query(&format!("{} ORDER BY b.id", STOCK_SELECT))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(stock_report_from_row).collect()
    }
}

fn stock_report_from_row(row: &sqlx::postgres::PgRow) -> AppResult<StockReport> {
    let book = Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        publication_date: row.try_get("publication_date")?,
        total_copies: row.try_get("total_copies")?,
        available_copies: row.try_get("available_copies")?,
        created_at: row.try_get("created_at")?,
    };
    Ok(StockReport::new(&book, row.try_get("copies_on_loan")?))
}
