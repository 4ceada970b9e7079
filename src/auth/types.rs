use serde::{Deserialize, Serialize};

use crate::db::entities::user;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn allows(self, required: Role) -> bool {
        self == Role::Admin || self == required
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Publication state of a terms document. Only `Published` terms can be
/// agreed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermsStatus {
    Draft,
    Published,
    Archived,
}

impl TermsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermsStatus::Draft => "DRAFT",
            TermsStatus::Published => "PUBLISHED",
            TermsStatus::Archived => "ARCHIVED",
        }
    }
}

pub trait RequiredRole {
    fn required() -> Role;
}

pub struct UserRole;

impl RequiredRole for UserRole {
    fn required() -> Role {
        Role::User
    }
}

pub struct AdminRole;

impl RequiredRole for AdminRole {
    fn required() -> Role {
        Role::Admin
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub did: String,
    pub typ: TokenKind,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub did: String,
    pub jti: String,
    pub typ: TokenKind,
    pub iat: usize,
    pub exp: usize,
}

/// The part of either token that identifies a session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SessionIdentity {
    pub sub: String,
    pub did: String,
    pub typ: TokenKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub approval_status: String,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            approval_status: user.approval_status.clone(),
        }
    }
}
