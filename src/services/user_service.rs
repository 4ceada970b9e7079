use chrono::{DateTime, FixedOffset};
use sea_orm::ConnectionTrait;

use crate::{
    auth::{
        credentials::{normalize_email, normalize_phone, validate_name, validate_user_id},
        password,
        types::{ApprovalStatus, Role},
    },
    db::dao::{DaoBase, DaoLayerError, NewUser, UniqueField, UserDao},
    db::entities::user,
    error::AppError,
};

/// Raw signup input before validation.
#[derive(Debug, Clone)]
pub struct UserCandidate {
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub password: String,
    pub email: Option<String>,
}

pub fn conflict(field: UniqueField) -> AppError {
    AppError::conflict(format!("{} is already in use", field.as_str()))
}

#[derive(Clone)]
pub struct UserService {
    user_dao: UserDao,
}

impl UserService {
    pub fn new(user_dao: UserDao) -> Self {
        Self { user_dao }
    }

    /// Validates and normalizes the candidate and hashes its password.
    /// Nothing is read from or written to storage.
    pub fn prepare(
        &self,
        candidate: UserCandidate,
        role: Role,
        approval: ApprovalStatus,
    ) -> Result<NewUser, AppError> {
        validate_user_id(&candidate.user_id)?;
        let name = validate_name(&candidate.name)?;
        let phone = normalize_phone(&candidate.phone)?;
        let email = normalize_email(candidate.email.as_deref())?;
        let password_hash = password::hash_password(&candidate.password)?;

        Ok(NewUser {
            user_id: candidate.user_id,
            name,
            phone,
            email,
            password_hash,
            role: role.as_str().to_string(),
            approval_status: approval.as_str().to_string(),
        })
    }

    /// First taken field in the order user id, phone, email.
    pub async fn first_conflict(&self, new_user: &NewUser) -> Result<Option<UniqueField>, AppError> {
        if self.user_dao.find_by_user_id(&new_user.user_id).await?.is_some() {
            return Ok(Some(UniqueField::UserId));
        }
        if self.user_dao.find_by_phone(&new_user.phone).await?.is_some() {
            return Ok(Some(UniqueField::Phone));
        }
        if let Some(email) = new_user.email.as_deref()
            && self.user_dao.find_by_email(email).await?.is_some()
        {
            return Ok(Some(UniqueField::Email));
        }
        Ok(None)
    }

    pub async fn ensure_available(&self, new_user: &NewUser) -> Result<(), AppError> {
        match self.first_conflict(new_user).await? {
            Some(field) => Err(conflict(field)),
            None => Ok(()),
        }
    }

    /// Inserts on `conn`. Unique violations are returned raw so the caller
    /// can resolve them once its transaction is gone.
    pub async fn insert_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_user: NewUser,
    ) -> Result<user::Model, DaoLayerError> {
        self.user_dao.insert_user(conn, new_user).await
    }

    /// Turns a unique violation into the conflict for the field it guards.
    /// When the driver message does not name a known column the table is
    /// queried again.
    pub async fn resolve_violation(&self, constraint: &str, new_user: &NewUser) -> AppError {
        if let Some(field) = UniqueField::from_constraint(constraint) {
            return conflict(field);
        }
        match self.first_conflict(new_user).await {
            Ok(Some(field)) => conflict(field),
            Ok(None) => AppError::conflict("Resource already exists"),
            Err(err) => err,
        }
    }

    /// Full create path used outside signup, e.g. the admin seed.
    pub async fn create_user(
        &self,
        candidate: UserCandidate,
        role: Role,
        approval: ApprovalStatus,
    ) -> Result<user::Model, AppError> {
        let new_user = self.prepare(candidate, role, approval)?;
        self.ensure_available(&new_user).await?;

        match self.insert_in(self.user_dao.db(), new_user.clone()).await {
            Ok(model) => Ok(model),
            Err(DaoLayerError::UniqueViolation { constraint }) => {
                Err(self.resolve_violation(&constraint, &new_user).await)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Option<user::Model>, AppError> {
        Ok(self.user_dao.find_by_user_id(user_id).await?)
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<user::Model>, AppError> {
        let phone = normalize_phone(phone)?;
        Ok(self.user_dao.find_by_phone(&phone).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, AppError> {
        match normalize_email(Some(email))? {
            Some(email) => Ok(self.user_dao.find_by_email(&email).await?),
            None => Ok(None),
        }
    }

    pub fn verify_password(&self, user: &user::Model, raw: &str) -> bool {
        password::verify_password(raw, &user.password_hash)
    }

    pub async fn set_last_login(
        &self,
        user_id: &str,
        at: DateTime<FixedOffset>,
    ) -> Result<(), AppError> {
        Ok(self.user_dao.set_last_login(user_id, at).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::{UserCandidate, UserService};
    use crate::{
        auth::types::{ApprovalStatus, Role},
        db::dao::{DaoBase, UserDao},
        error::AppError,
        test_helpers::sqlite_db,
    };

    fn candidate(user_id: &str, phone: &str, email: Option<&str>) -> UserCandidate {
        UserCandidate {
            user_id: user_id.to_string(),
            name: "Kim".to_string(),
            phone: phone.to_string(),
            password: "Secret!12".to_string(),
            email: email.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_user_normalizes_and_hashes() {
        let db = sqlite_db().await;
        let service = UserService::new(UserDao::new(&db));

        let user = service
            .create_user(
                candidate("abc123", "010-1234-5678", Some("Kim@Example.com")),
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect("user should be created");

        assert_eq!(user.phone, "01012345678");
        assert_eq!(user.email.as_deref(), Some("kim@example.com"));
        assert_ne!(user.password_hash, "Secret!12");
        assert!(service.verify_password(&user, "Secret!12"));
        assert!(!service.verify_password(&user, "Secret!13"));

        let by_phone = service
            .find_by_phone("010 1234 5678")
            .await
            .expect("lookup should succeed");
        assert_eq!(by_phone.map(|u| u.user_id).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn conflicts_name_the_first_taken_field() {
        let db = sqlite_db().await;
        let service = UserService::new(UserDao::new(&db));
        service
            .create_user(
                candidate("abc123", "01012345678", Some("kim@example.com")),
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect("user should be created");

        let same_id = service
            .create_user(
                candidate("abc123", "01099998888", None),
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect_err("duplicate id should fail");
        assert_eq!(same_id, AppError::conflict("userId is already in use"));

        let same_phone = service
            .create_user(
                candidate("other1", "010-1234-5678", None),
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect_err("duplicate phone should fail");
        assert_eq!(same_phone, AppError::conflict("phone is already in use"));

        let same_email = service
            .create_user(
                candidate("other2", "01055556666", Some("KIM@example.com")),
                Role::User,
                ApprovalStatus::Pending,
            )
            .await
            .expect_err("duplicate email should fail");
        assert_eq!(same_email, AppError::conflict("email is already in use"));
    }

    #[tokio::test]
    async fn missing_rows_are_none() {
        let db = sqlite_db().await;
        let service = UserService::new(UserDao::new(&db));

        assert!(
            service
                .find_by_user_id("ghost")
                .await
                .expect("lookup should succeed")
                .is_none()
        );
        assert!(
            service
                .find_by_email("ghost@example.com")
                .await
                .expect("lookup should succeed")
                .is_none()
        );
    }

    #[test]
    fn prepare_rejects_bad_phone_before_hashing() {
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Postgres).into_connection();
        let service = UserService::new(UserDao::new(&db));

        let err = service
            .prepare(
                candidate("abc123", "123", None),
                Role::User,
                ApprovalStatus::Pending,
            )
            .expect_err("bad phone should fail");
        assert!(matches!(err, AppError::Validation(_)));
    }
}
