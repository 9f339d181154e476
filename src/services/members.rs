//! Member management service

use crate::{
    error::AppResult,
    models::{
        loan::LoanDetails,
        member::{CreateMember, Member, MemberQuery, UpdateMember},
    },
    repository::Repository,
};

use super::today;

#[derive(Clone)]
pub struct MembersService {
    repository: Repository,
}

impl MembersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_member(&self, id: i32) -> AppResult<Member> {
        self.repository.members.get_by_id(id).await
    }

    pub async fn list_members(&self, query: &MemberQuery) -> AppResult<(Vec<Member>, i64)> {
        self.repository.members.list(query).await
    }

    pub async fn create_member(&self, member: &CreateMember) -> AppResult<Member> {
        let created = self.repository.members.create(member).await?;
        tracing::info!("Member {} registered", created.id);
        Ok(created)
    }

    pub async fn update_member(&self, id: i32, member: &UpdateMember) -> AppResult<Member> {
        self.repository.members.update(id, member).await
    }

    /// Every loan of a member with derived status, newest first.
    /// Fails with `NotFound` for an unknown member rather than returning
    /// an empty list.
    pub async fn member_loans(&self, member_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.members.get_by_id(member_id).await?;
        self.repository.queries.member_loans(member_id, today()).await
    }
}
