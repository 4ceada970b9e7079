use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    auth::jwt::TokenIssuer,
    db::dao::DaoContext,
    services::{
        auth_service::AuthService, email_verification_service::EmailVerificationService,
        mailer::Mailer, session_registry::SessionRegistry, user_service::UserService,
    },
    state::AppState,
};

#[derive(Clone)]
pub struct ServiceContext {
    daos: DaoContext,
}

impl ServiceContext {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self {
            daos: DaoContext::new(db),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(&state.db)
    }

    pub fn user(&self) -> UserService {
        UserService::new(self.daos.user())
    }

    pub fn sessions(&self) -> SessionRegistry {
        SessionRegistry::new(self.daos.refresh_token())
    }

    pub fn auth(&self, tokens: &TokenIssuer) -> AuthService {
        AuthService::new(
            self.daos.db().clone(),
            self.user(),
            self.sessions(),
            self.daos.terms(),
            self.daos.consent(),
            tokens.clone(),
        )
    }

    pub fn email_verification(&self, mailer: Arc<dyn Mailer>) -> EmailVerificationService {
        EmailVerificationService::new(self.daos.email_verification(), mailer)
    }
}
