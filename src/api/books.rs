//! Book (catalog) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::book::{Book, BookDetails, BookQuery, CreateBook, StockReport, UpdateBook},
    AppState,
};

use super::{CurrentUser, PaginatedResponse};

/// List books with their categories
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "List of books", body = PaginatedResponse<BookDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    CurrentUser(_principal): CurrentUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookDetails>>> {
    let (books, total) = state.services.catalog.list_books(&query).await?;
    Ok(Json(PaginatedResponse::new(books, total, query.page, query.per_page)))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    CurrentUser(_principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.catalog.get_book_details(id).await?;
    Ok(Json(book))
}

/// Register a new book; every copy starts on the shelf
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator rights required"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    principal.require_admin()?;
    book.validate()?;

    let created = state.services.inventory.create_book(&book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Total below copies on loan")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
    Json(book): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    principal.require_admin()?;
    book.validate()?;

    let updated = state.services.inventory.update_book(id, &book).await?;
    Ok(Json(updated))
}

/// Delete a book with no loan history
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book is referenced by loans")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    principal.require_admin()?;

    state.services.inventory.delete_book_guarded(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Compare a book's available count with its open loans
#[utoipa::path(
    get,
    path = "/books/{id}/stock",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Stock report", body = StockReport),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_stock(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<StockReport>> {
    principal.require_admin()?;

    let report = state.services.inventory.audit_stock(id).await?;
    Ok(Json(report))
}
