//! Member store

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member, MemberQuery, UpdateMember},
};

const MEMBER_COLUMNS: &str = "id, name, email, phone, address, status, created_at";

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get member by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE id = $1",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// List members, optionally filtered by status
    pub async fn list(&self, query: &MemberQuery) -> AppResult<(Vec<Member>, i64)> {
        let (limit, offset) = crate::models::book::page_window(query.page, query.per_page);

        let members = sqlx::query_as::<_, Member>(&format!(
            r#"
            SELECT {} FROM members
            WHERE ($1::member_status IS NULL OR status = $1)
            ORDER BY name, id
            LIMIT $2 OFFSET $3
            "#,
            MEMBER_COLUMNS
        ))
        .bind(query.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM members WHERE ($1::member_status IS NULL OR status = $1)",
        )
        .bind(query.status)
        .fetch_one(&self.pool)
        .await?;

        Ok((members, total))
    }

    /// Create a new member
    pub async fn create(&self, member: &CreateMember) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (name, email, phone, address, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(member.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from(e).on_unique_violation("A member with this email already exists"))
    }

    /// Update a member
    pub async fn update(&self, id: i32, member: &UpdateMember) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            UPDATE members SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                status = COALESCE($6, status)
            WHERE id = $1
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.address)
        .bind(member.status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from(e).on_unique_violation("A member with this email already exists"))?
        .ok_or_else(|| not_found(id))
    }

    /// Hold the member row against deletion for the rest of the transaction
    /// without blocking concurrent checkouts by the same member.
    pub async fn lock_shared(&self, conn: &mut PgConnection, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE id = $1 FOR KEY SHARE",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Exclusive lock, taken before deletion
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE id = $1 FOR UPDATE",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
    }

    /// Delete a member with no loan history at all
    pub async fn delete(&self, conn: &mut PgConnection, id: i32) -> AppResult<()> {
        let loans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE member_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if loans > 0 {
            return Err(AppError::InUse(format!(
                "Member {} has {} loan record(s)",
                id, loans
            )));
        }

        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: i32) -> AppError {
    AppError::NotFound(format!("Member with id {} not found", id))
}
