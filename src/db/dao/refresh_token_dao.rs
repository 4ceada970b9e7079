use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::refresh_token::{self, Entity as RefreshToken};

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub device_id: String,
    pub device_type: Option<String>,
    pub jti: String,
    pub token_hash: String,
    pub expires_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone)]
pub struct Rotation<'a> {
    pub old_jti: &'a str,
    pub new_jti: &'a str,
    pub new_hash: &'a str,
    pub new_expires_at: DateTime<FixedOffset>,
}

#[derive(Clone)]
pub struct RefreshTokenDao {
    db: DatabaseConnection,
}

impl DaoBase for RefreshTokenDao {
    type Entity = RefreshToken;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl RefreshTokenDao {
    /// Inserts or replaces the session row for `(user_id, device_id)`. A
    /// replaced row gets the new jti and hash and is un-revoked.
    pub async fn upsert_session(
        &self,
        record: SessionRecord,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        let model = refresh_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(record.user_id),
            device_id: Set(record.device_id),
            device_type: Set(record.device_type),
            jti: Set(record.jti),
            token_hash: Set(record.token_hash),
            expires_at: Set(record.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
            last_used_at: Set(None),
            revoked_at: Set(None),
        };

        RefreshToken::insert(model)
            .on_conflict(
                OnConflict::columns([
                    refresh_token::Column::UserId,
                    refresh_token::Column::DeviceId,
                ])
                .update_columns([
                    refresh_token::Column::DeviceType,
                    refresh_token::Column::Jti,
                    refresh_token::Column::TokenHash,
                    refresh_token::Column::ExpiresAt,
                    refresh_token::Column::UpdatedAt,
                    refresh_token::Column::LastUsedAt,
                    refresh_token::Column::RevokedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;
        Ok(())
    }

    pub async fn find_by_jti(&self, jti: &str) -> DaoResult<Option<refresh_token::Model>> {
        let jti = jti.to_string();
        self.find_one(move |query| query.filter(refresh_token::Column::Jti.eq(jti)))
            .await
    }

    /// Swaps the row currently holding `old_jti` over to the new token.
    /// Returns `false` when no live row held `old_jti` any more.
    pub async fn rotate(
        &self,
        rotation: Rotation<'_>,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<bool> {
        let result = RefreshToken::update_many()
            .col_expr(refresh_token::Column::Jti, Expr::value(rotation.new_jti))
            .col_expr(
                refresh_token::Column::TokenHash,
                Expr::value(rotation.new_hash),
            )
            .col_expr(
                refresh_token::Column::ExpiresAt,
                Expr::value(rotation.new_expires_at),
            )
            .col_expr(refresh_token::Column::LastUsedAt, Expr::value(Some(now)))
            .col_expr(refresh_token::Column::UpdatedAt, Expr::value(now))
            .filter(refresh_token::Column::Jti.eq(rotation.old_jti))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .filter(refresh_token::Column::ExpiresAt.gt(now))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;

        Ok(result.rows_affected == 1)
    }

    /// Revokes the live session for one device. Already-revoked or missing
    /// rows are left alone.
    pub async fn revoke_device(
        &self,
        user_id: &str,
        device_id: &str,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<u64> {
        let result = RefreshToken::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(refresh_token::Column::UpdatedAt, Expr::value(now))
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::DeviceId.eq(device_id))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;
        Ok(result.rows_affected)
    }

    pub async fn revoke_all_for_user(
        &self,
        user_id: &str,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<u64> {
        let result = RefreshToken::update_many()
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(Some(now)))
            .col_expr(refresh_token::Column::UpdatedAt, Expr::value(now))
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;
        Ok(result.rows_affected)
    }
}
