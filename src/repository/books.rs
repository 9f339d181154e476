//! Catalog store: book rows and their copy counters

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
};

const BOOK_COLUMNS: &str =
    "id, title, author, publication_date, total_copies, available_copies, created_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID (display read, takes no lock)
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Re-read a book under a row lock held until the enclosing transaction ends
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Insert a book; a new book has every copy on the shelf
    pub async fn create(&self, conn: &mut PgConnection, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, publication_date, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_date)
        .bind(book.total_copies)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    /// Write descriptive fields and an already-checked pair of counters
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: i32,
        fields: &UpdateBook,
        total_copies: i32,
        available_copies: i32,
    ) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                publication_date = COALESCE($4, publication_date),
                total_copies = $5,
                available_copies = $6
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.author)
        .bind(fields.publication_date)
        .bind(total_copies)
        .bind(available_copies)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Apply `delta` to the available counter.
    ///
    /// The guard lives in the statement itself, so a caller that skipped its
    /// own pre-check still cannot push the counter outside `[0, total_copies]`;
    /// it gets a `Conflict` instead.
    pub async fn adjust_available_copies(
        &self,
        conn: &mut PgConnection,
        id: i32,
        delta: i32,
    ) -> AppResult<Book> {
        let adjusted = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET available_copies = available_copies + $2
            WHERE id = $1
              AND available_copies + $2 >= 0
              AND available_copies + $2 <= total_copies
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *conn)
        .await?;

        match adjusted {
            Some(book) => Ok(book),
            None => {
                let current = self.lock(conn, id).await?;
                current.checked_available(delta)?;
                Err(AppError::Conflict(format!(
                    "Stock adjustment on book {} was rejected",
                    id
                )))
            }
        }
    }

    /// Delete a book that no loan row references, whatever the loan status.
    /// The caller holds the book's row lock.
    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let loans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if loans > 0 {
            return Err(AppError::InUse(format!(
                "Book {} is referenced by {} loan(s)",
                id, loans
            )));
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Replace the category tags of a book
    pub async fn set_categories(
        &self,
        conn: &mut PgConnection,
        id: i32,
        category_ids: &[i32],
    ) -> AppResult<()> {
        let mut ids = category_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_one(&mut *conn)
            .await?;
        if known != ids.len() as i64 {
            return Err(AppError::NotFound(
                "One or more categories do not exist".to_string(),
            ));
        }

        sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO book_categories (book_id, category_id)
            SELECT $1, UNNEST($2::int[])
            "#,
        )
        .bind(id)
        .bind(&ids)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}
