pub mod auth_service;
pub mod context;
pub mod email_verification_service;
pub mod mailer;
pub mod session_registry;
pub mod user_service;

pub use context::ServiceContext;
