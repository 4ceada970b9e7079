#[allow(unused_imports)]
pub mod prelude {
    pub use super::email_verification::Entity as EmailVerification;
    pub use super::refresh_token::Entity as RefreshToken;
    pub use super::terms::Entity as Terms;
    pub use super::user::Entity as User;
    pub use super::user_consent::Entity as UserConsent;
}

pub mod email_verification;
pub mod refresh_token;
pub mod terms;
pub mod user;
pub mod user_consent;
