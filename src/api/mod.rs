//! API handlers for Shelfmark REST endpoints
//!
//! Handlers check the caller's rights first, validate the request second,
//! and only then reach a service.

pub mod books;
pub mod categories;
pub mod health;
pub mod loans;
pub mod members;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::principal::{Principal, TokenClaims},
    AppState,
};

/// Extractor for the calling principal, resolved from a bearer token.
/// Rejects with 401 before the request body is read.
pub struct CurrentUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = resolve_principal(parts, &state.config.auth.jwt_secret);
        principal.require_read()?;
        Ok(CurrentUser(principal))
    }
}

fn resolve_principal(parts: &Parts, secret: &str) -> Principal {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Principal::Unauthenticated;
    };

    match TokenClaims::from_token(token, secret) {
        Ok(claims) => Principal::from(claims),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            Principal::Unauthenticated
        }
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub items: Vec<T>,
    /// Total number of matching rows
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, page: Option<i64>, per_page: Option<i64>) -> Self {
        let (limit, offset) = crate::models::book::page_window(page, per_page);
        Self {
            items,
            total,
            page: offset / limit + 1,
            per_page: limit,
        }
    }
}
