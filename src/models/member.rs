//! Member model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Membership status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "member_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MemberStatus::Active),
            "inactive" => Ok(MemberStatus::Inactive),
            _ => Err(format!("Invalid member status: {}", s)),
        }
    }
}

/// Member row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

/// Short member representation embedded in loan views
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberShort {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// Create member request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMember {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[serde(default)]
    pub status: MemberStatus,
}

/// Update member request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMember {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "Phone cannot be empty"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub address: Option<String>,
    pub status: Option<MemberStatus>,
}

/// Member list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct MemberQuery {
    pub status: Option<MemberStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("ACTIVE".parse::<MemberStatus>().unwrap(), MemberStatus::Active);
        assert_eq!("inactive".parse::<MemberStatus>().unwrap(), MemberStatus::Inactive);
        assert!("banned".parse::<MemberStatus>().is_err());
    }

    #[test]
    fn test_create_member_defaults_active() {
        let req: CreateMember = serde_json::from_str(
            r#"{"name":"Ada","email":"ada@example.org","phone":"555","address":"1 Main St"}"#,
        )
        .unwrap();
        assert_eq!(req.status, MemberStatus::Active);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_member_rejects_bad_email() {
        let req: CreateMember = serde_json::from_str(
            r#"{"name":"Ada","email":"not-an-email","phone":"555","address":"1 Main St"}"#,
        )
        .unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("email"));
    }
}
