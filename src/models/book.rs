//! Book (catalog) model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::category::Category;
use crate::error::{AppError, AppResult};

/// Book row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub publication_date: NaiveDate,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently held by open loans
    pub fn copies_on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// Available count after applying `delta`, or `Conflict` when it would
    /// leave `[0, total_copies]`.
    pub fn checked_available(&self, delta: i32) -> AppResult<i32> {
        let next = self.available_copies.checked_add(delta).ok_or_else(|| {
            AppError::Conflict(format!("Stock adjustment overflow on book {}", self.id))
        })?;
        if next < 0 || next > self.total_copies {
            return Err(AppError::Conflict(format!(
                "Adjusting book {} by {} would leave {} of {} copies available",
                self.id, delta, next, self.total_copies
            )));
        }
        Ok(next)
    }

    /// Available count after changing the owned total to `new_total`, keeping
    /// the copies on loan untouched.
    pub fn resized_available(&self, new_total: i32) -> AppResult<i32> {
        let on_loan = self.copies_on_loan();
        if new_total < 1 {
            return Err(AppError::Validation("A book must own at least one copy".to_string()));
        }
        if new_total < on_loan {
            return Err(AppError::Conflict(format!(
                "Book {} has {} copies on loan, cannot reduce total to {}",
                self.id, on_loan, new_total
            )));
        }
        Ok(new_total - on_loan)
    }
}

/// Book with its category tags, for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub category_ids: Vec<i32>,
    pub categories: Vec<Category>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub publication_date: NaiveDate,
    #[validate(range(min = 1, message = "A book must own at least one copy"))]
    pub total_copies: i32,
    #[serde(default)]
    pub category_ids: Vec<i32>,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub publication_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "A book must own at least one copy"))]
    pub total_copies: Option<i32>,
    /// Replaces every category tag when present
    pub category_ids: Option<Vec<i32>>,
}

/// Book list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn limit_offset(&self) -> (i64, i64) {
        page_window(self.page, self.per_page)
    }
}

const MAX_PER_PAGE: i64 = 200;

/// Highest page whose offset still fits an `i64` at the largest page size
const MAX_PAGE: i64 = i64::MAX / MAX_PER_PAGE;

/// Clamp page/per_page into a LIMIT/OFFSET pair
pub fn page_window(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    let per_page = per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE);
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    (per_page, (page - 1) * per_page)
}

/// Result of comparing a book's counter with its loan rows
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockReport {
    pub book_id: i32,
    pub total_copies: i32,
    pub available_copies: i32,
    pub copies_on_loan: i64,
    pub consistent: bool,
}

impl StockReport {
    pub fn new(book: &Book, copies_on_loan: i64) -> Self {
        Self {
            book_id: book.id,
            total_copies: book.total_copies,
            available_copies: book.available_copies,
            copies_on_loan,
            consistent: i64::from(book.available_copies)
                == i64::from(book.total_copies) - copies_on_loan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(total: i32, available: i32) -> Book {
        Book {
            id: 7,
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            publication_date: NaiveDate::from_ymd_opt(1965, 8, 1).unwrap(),
            total_copies: total,
            available_copies: available,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_checked_available_bounds() {
        let b = book(2, 1);
        assert_eq!(b.checked_available(-1).unwrap(), 0);
        assert_eq!(b.checked_available(1).unwrap(), 2);
        assert!(matches!(b.checked_available(-2), Err(AppError::Conflict(_))));
        assert!(matches!(b.checked_available(2), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_checked_available_empty_shelf() {
        let b = book(1, 0);
        assert!(matches!(b.checked_available(-1), Err(AppError::Conflict(_))));
        assert_eq!(b.checked_available(1).unwrap(), 1);
    }

    #[test]
    fn test_resize_keeps_loans() {
        let b = book(3, 1);
        assert_eq!(b.copies_on_loan(), 2);
        assert_eq!(b.resized_available(5).unwrap(), 3);
        assert_eq!(b.resized_available(2).unwrap(), 0);
        assert!(matches!(b.resized_available(1), Err(AppError::Conflict(_))));
        assert!(matches!(b.resized_available(0), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_stock_report() {
        let b = book(3, 1);
        assert!(StockReport::new(&b, 2).consistent);
        assert!(!StockReport::new(&b, 1).consistent);
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(None, None), (20, 0));
        assert_eq!(page_window(Some(3), Some(10)), (10, 20));
        assert_eq!(page_window(Some(0), Some(0)), (1, 0));
        assert_eq!(page_window(Some(1), Some(10_000)), (200, 0));
    }

    #[test]
    fn test_page_window_huge_page_stays_in_range() {
        let (limit, offset) = page_window(Some(i64::MAX), Some(200));
        assert_eq!(limit, 200);
        assert!(offset >= 0);
        assert_eq!(offset, (MAX_PAGE - 1) * 200);

        let (_, offset) = page_window(Some(i64::MAX), Some(1));
        assert!(offset >= 0);
        let (_, offset) = page_window(Some(i64::MIN), None);
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_create_book_validation() {
        let req = CreateBook {
            title: String::new(),
            author: "A".to_string(),
            publication_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            total_copies: 0,
            category_ids: vec![],
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("total_copies"));
    }
}
