use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, sea_query::Expr,
};

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::{prelude::User, user};

/// Columns carrying a uniqueness guarantee on `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    UserId,
    Phone,
    Email,
}

impl UniqueField {
    /// Name of the field as the API exposes it.
    pub fn as_str(self) -> &'static str {
        match self {
            UniqueField::UserId => "userId",
            UniqueField::Phone => "phone",
            UniqueField::Email => "email",
        }
    }

    /// Maps a unique-constraint violation reported by the driver back to the
    /// column it guards. Postgres reports the constraint name, SQLite reports
    /// `table.column`.
    pub fn from_constraint(constraint: &str) -> Option<Self> {
        let constraint = constraint.to_ascii_lowercase();
        if constraint.contains("user_consents") || constraint.contains("refresh_tokens") {
            return None;
        }
        if constraint.contains("email") {
            Some(UniqueField::Email)
        } else if constraint.contains("phone") {
            Some(UniqueField::Phone)
        } else if constraint.contains("users_pkey")
            || constraint.contains("users.user_id")
            || constraint.contains("pk-users")
        {
            Some(UniqueField::UserId)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub approval_status: String,
}

#[derive(Clone)]
pub struct UserDao {
    db: DatabaseConnection,
}

impl DaoBase for UserDao {
    type Entity = User;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl UserDao {
    pub async fn find_by_user_id(&self, user_id: &str) -> DaoResult<Option<user::Model>> {
        User::find_by_id(user_id.to_string())
            .one(&self.db)
            .await
            .map_err(DaoLayerError::from_db)
    }

    pub async fn find_by_phone(&self, phone: &str) -> DaoResult<Option<user::Model>> {
        let phone = phone.to_string();
        self.find_one(move |query| query.filter(user::Column::Phone.eq(phone)))
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> DaoResult<Option<user::Model>> {
        let email = email.to_string();
        self.find_one(move |query| query.filter(user::Column::Email.eq(email)))
            .await
    }

    /// Inserts on the given connection so signup can run it inside its
    /// transaction.
    pub async fn insert_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_user: NewUser,
    ) -> DaoResult<user::Model> {
        let now = Utc::now().fixed_offset();
        let model = user::ActiveModel {
            user_id: Set(new_user.user_id),
            name: Set(new_user.name),
            phone: Set(new_user.phone),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            role: Set(new_user.role),
            approval_status: Set(new_user.approval_status),
            enabled: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(conn).await.map_err(DaoLayerError::from_db)
    }

    pub async fn set_last_login(&self, user_id: &str, at: DateTime<FixedOffset>) -> DaoResult<()> {
        let result = User::update_many()
            .col_expr(user::Column::LastLoginAt, Expr::value(Some(at)))
            .col_expr(user::Column::UpdatedAt, Expr::value(at))
            .filter(user::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;

        if result.rows_affected == 0 {
            return Err(DaoLayerError::not_found("user", user_id));
        }
        Ok(())
    }
}
