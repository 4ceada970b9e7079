pub mod bootstrap;
pub mod credentials;
pub mod jwt;
pub mod password;
pub mod types;

pub use types::{
    AccessClaims, AdminRole, ApprovalStatus, RefreshClaims, RequiredRole, Role, TokenKind,
    TokenPair, UserRole, UserSummary,
};
