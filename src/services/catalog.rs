//! Catalog service: book reads and category tags.
//!
//! Book writes that touch stock live on the inventory coordinator.

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookDetails, BookQuery},
        category::{Category, CreateCategory, UpdateCategory},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get book by ID (bare row)
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Get book by ID with its categories
    pub async fn get_book_details(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.queries.book_with_categories(id).await
    }

    /// Page of books with their categories
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        self.repository.queries.books_with_categories(query).await
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn get_category(&self, id: i32) -> AppResult<Category> {
        self.repository.categories.get_by_id(id).await
    }

    pub async fn create_category(&self, category: &CreateCategory) -> AppResult<Category> {
        let created = self.repository.categories.create(category).await?;
        tracing::info!("Category {} ({}) created", created.id, created.name);
        Ok(created)
    }

    pub async fn update_category(&self, id: i32, category: &UpdateCategory) -> AppResult<Category> {
        self.repository.categories.update(id, category).await
    }

    /// Delete a category. Book tags go with it; stock is untouched.
    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.categories.delete(id).await?;
        tracing::info!("Category {} deleted", id);
        Ok(())
    }
}
