use sea_orm::DatabaseConnection;

use super::{
    ConsentDao, DaoBase, EmailVerificationDao, RefreshTokenDao, TermsDao, UserDao,
};

#[derive(Clone)]
pub struct DaoContext {
    db: DatabaseConnection,
}

impl DaoContext {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn user(&self) -> UserDao {
        DaoBase::new(&self.db)
    }

    pub fn refresh_token(&self) -> RefreshTokenDao {
        DaoBase::new(&self.db)
    }

    pub fn terms(&self) -> TermsDao {
        DaoBase::new(&self.db)
    }

    pub fn consent(&self) -> ConsentDao {
        DaoBase::new(&self.db)
    }

    pub fn email_verification(&self) -> EmailVerificationDao {
        DaoBase::new(&self.db)
    }
}
