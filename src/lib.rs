//! Shelfmark library inventory server
//!
//! Keeps book stock and the loan ledger consistent under concurrent
//! checkouts, returns and administrative edits, and serves them over a
//! REST JSON API.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Books
        .route(
            "/books",
            get(api::books::list_books).post(api::books::create_book),
        )
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        .route("/books/:id/stock", get(api::books::get_book_stock))
        // Members
        .route(
            "/members",
            get(api::members::list_members).post(api::members::create_member),
        )
        .route(
            "/members/:id",
            get(api::members::get_member)
                .put(api::members::update_member)
                .delete(api::members::delete_member),
        )
        .route("/members/:id/loans", get(api::members::get_member_loans))
        // Loans
        .route(
            "/loans",
            get(api::loans::list_loans).post(api::loans::create_loan),
        )
        .route(
            "/loans/:id",
            get(api::loans::get_loan)
                .put(api::loans::update_loan)
                .delete(api::loans::delete_loan),
        )
        .route("/loans/:id/return", post(api::loans::return_loan))
        // Categories
        .route(
            "/categories",
            get(api::categories::list_categories).post(api::categories::create_category),
        )
        .route(
            "/categories/:id",
            get(api::categories::get_category)
                .put(api::categories::update_category)
                .delete(api::categories::delete_category),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(api::openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
