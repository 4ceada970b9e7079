pub mod base;
pub mod consent_dao;
pub mod context;
pub mod email_verification_dao;
pub mod error;
pub mod refresh_token_dao;
pub mod terms_dao;
pub mod user_dao;

pub use base::DaoBase;
pub use consent_dao::{ConsentDao, NewConsent};
pub use context::DaoContext;
pub use email_verification_dao::EmailVerificationDao;
pub use error::{DaoLayerError, DaoResult};
pub use refresh_token_dao::{RefreshTokenDao, Rotation, SessionRecord};
pub use terms_dao::{NewTerms, TermsDao};
pub use user_dao::{NewUser, UniqueField, UserDao};
