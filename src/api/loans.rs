//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        loan::{CreateLoan, Loan, LoanDetails, LoanQuery, UpdateLoan},
        principal::Principal,
    },
    services::today,
    AppState,
};

use super::{CurrentUser, PaginatedResponse};

/// List loans. Members only ever see their own.
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "List of loans", body = PaginatedResponse<LoanDetails>),
        (status = 403, description = "Filtering on another member")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(mut query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    if let Principal::Member { id } = principal {
        if let Some(member_id) = query.member_id {
            principal.require_member_access(member_id)?;
        }
        query.member_id = Some(id);
    }

    let (loans, total) = state.services.loans.list_loans(&query).await?;
    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.per_page)))
}

/// Get loan details by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Not your loan"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan_details(id).await?;
    principal.require_member_access(loan.member.id)?;
    Ok(Json(loan))
}

/// Check out one copy of a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Member or book not found"),
        (status = 409, description = "No copy available")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    principal.require_admin()?;
    request.validate()?;

    let (loan_date, due_date) =
        request.resolved_dates(today(), state.services.default_loan_days)?;

    let loan = state
        .services
        .inventory
        .checkout(request.member_id, request.book_id, loan_date, due_date)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Loan>> {
    principal.require_admin()?;

    let loan = state.services.inventory.return_book(id).await?;
    Ok(Json(loan))
}

/// Correct a loan record
#[utoipa::path(
    put,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = UpdateLoan,
    responses(
        (status = 200, description = "Loan updated", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Loan, member or book not found"),
        (status = 409, description = "No copy available for the edited loan")
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateLoan>,
) -> AppResult<Json<Loan>> {
    principal.require_admin()?;
    request.validate()?;

    let loan = state.services.inventory.update_loan(id, &request).await?;
    Ok(Json(loan.observed(today())))
}

/// Delete a loan; a copy it still held goes back on the shelf
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    principal.require_admin()?;

    state.services.inventory.delete_loan_guarded(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
