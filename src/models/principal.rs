//! Caller identity resolved at the request boundary

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// Bearer token claims. Tokens are issued by the sign-in front end; this
/// server only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl TokenClaims {
    /// Verify an HS256 token and return its claims
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

/// Who is calling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin { id: i32 },
    Member { id: i32 },
    Unauthenticated,
}

impl From<TokenClaims> for Principal {
    fn from(claims: TokenClaims) -> Self {
        match claims.role {
            Role::Admin => Principal::Admin { id: claims.user_id },
            Role::Member => Principal::Member { id: claims.user_id },
        }
    }
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    /// Any signed-in caller may read
    pub fn require_read(&self) -> Result<(), AppError> {
        match self {
            Principal::Unauthenticated => {
                Err(AppError::Authentication("Missing or invalid bearer token".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Catalog, member and loan writes are reserved to administrators
    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_read()?;
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator rights required".to_string()))
        }
    }

    /// Administrators see every member; members only themselves
    pub fn require_member_access(&self, member_id: i32) -> Result<(), AppError> {
        match self {
            Principal::Admin { .. } => Ok(()),
            Principal::Member { id } if *id == member_id => Ok(()),
            Principal::Member { .. } => Err(AppError::Authorization(
                "Members can only access their own records".to_string(),
            )),
            Principal::Unauthenticated => {
                Err(AppError::Authentication("Missing or invalid bearer token".to_string()))
            }
        }
    }
}
