//! Member endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        loan::LoanDetails,
        member::{CreateMember, Member, MemberQuery, UpdateMember},
    },
    AppState,
};

use super::{CurrentUser, PaginatedResponse};

/// List members
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    params(MemberQuery),
    responses(
        (status = 200, description = "List of members", body = PaginatedResponse<Member>),
        (status = 403, description = "Administrator rights required")
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Query(query): Query<MemberQuery>,
) -> AppResult<Json<PaginatedResponse<Member>>> {
    principal.require_admin()?;

    let (members, total) = state.services.members.list_members(&query).await?;
    Ok(Json(PaginatedResponse::new(members, total, query.page, query.per_page)))
}

/// Get member by ID
#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member", body = Member),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Member>> {
    principal.require_member_access(id)?;

    let member = state.services.members.get_member(id).await?;
    Ok(Json(member))
}

/// Register a member
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = Member),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(member): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    principal.require_admin()?;
    member.validate()?;

    let created = state.services.members.create_member(&member).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a member
#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
    Json(member): Json<UpdateMember>,
) -> AppResult<Json<Member>> {
    principal.require_admin()?;
    member.validate()?;

    let updated = state.services.members.update_member(id, &member).await?;
    Ok(Json(updated))
}

/// Delete a member with no loan history
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Member has loan records")
    )
)]
pub async fn delete_member(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    principal.require_admin()?;

    state.services.inventory.delete_member_guarded(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get every loan of a member
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "members",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's loans", body = Vec<LoanDetails>),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member_loans(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    principal.require_member_access(id)?;

    let loans = state.services.members.member_loans(id).await?;
    Ok(Json(loans))
}
