//! Repository layer for database operations
//!
//! Plain reads go through the pool. Anything that precedes a write takes a
//! `&mut PgConnection` borrowed from a transaction opened with
//! [`Repository::begin`], so its row locks live as long as that transaction.

pub mod books;
pub mod categories;
pub mod loans;
pub mod members;
pub mod queries;

use sqlx::{Pool, Postgres, Transaction};

use crate::error::AppResult;

/// Default bound on a single lock wait, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub categories: categories::CategoriesRepository,
    pub members: members::MembersRepository,
    pub loans: loans::LoansRepository,
    pub queries: queries::QueryRepository,
    lock_timeout_ms: u64,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            categories: categories::CategoriesRepository::new(pool.clone()),
            members: members::MembersRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            queries: queries::QueryRepository::new(pool.clone()),
            pool,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Override the per-transaction lock wait bound
    pub fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Open a transaction whose lock waits fail with SQLSTATE 55P03 instead
    /// of blocking past the configured bound.
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Round-trip to the database
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
