use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::{Expr, ExprTrait, OnConflict},
};
use uuid::Uuid;

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::email_verification::{self, Entity as EmailVerification};

#[derive(Clone)]
pub struct EmailVerificationDao {
    db: DatabaseConnection,
}

impl DaoBase for EmailVerificationDao {
    type Entity = EmailVerification;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl EmailVerificationDao {
    pub async fn find_by_email(
        &self,
        email: &str,
    ) -> DaoResult<Option<email_verification::Model>> {
        let email = email.to_string();
        self.find_one(move |query| query.filter(email_verification::Column::Email.eq(email)))
            .await
    }

    /// Stores a fresh code for `email`, resetting the attempt counter and any
    /// earlier verification.
    pub async fn upsert_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        let model = email_verification::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            code_hash: Set(code_hash.to_string()),
            expires_at: Set(expires_at),
            requested_at: Set(now),
            verified_at: Set(None),
            try_count: Set(0),
        };

        EmailVerification::insert(model)
            .on_conflict(
                OnConflict::column(email_verification::Column::Email)
                    .update_columns([
                        email_verification::Column::CodeHash,
                        email_verification::Column::ExpiresAt,
                        email_verification::Column::RequestedAt,
                        email_verification::Column::VerifiedAt,
                        email_verification::Column::TryCount,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;
        Ok(())
    }

    /// Claims one attempt against the row. Returns `false` once `max_tries`
    /// attempts are used; the count check and the increment are one statement.
    pub async fn reserve_attempt(&self, id: Uuid, max_tries: i32) -> DaoResult<bool> {
        let result = EmailVerification::update_many()
            .col_expr(
                email_verification::Column::TryCount,
                Expr::col(email_verification::Column::TryCount).add(1),
            )
            .filter(email_verification::Column::Id.eq(id))
            .filter(email_verification::Column::TryCount.lt(max_tries))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_verified(&self, id: Uuid, at: DateTime<FixedOffset>) -> DaoResult<()> {
        let result = EmailVerification::update_many()
            .col_expr(email_verification::Column::VerifiedAt, Expr::value(Some(at)))
            .filter(email_verification::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::from_db)?;

        if result.rows_affected == 0 {
            return Err(DaoLayerError::not_found("email_verification", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

    use super::EmailVerificationDao;
    use crate::db::dao::{DaoBase, DaoLayerError};

    #[tokio::test]
    async fn mark_verified_requires_existing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let dao = EmailVerificationDao::new(&db);

        let err = dao
            .mark_verified(Uuid::new_v4(), chrono::Utc::now().fixed_offset())
            .await
            .expect_err("missing row should fail");
        assert!(matches!(
            err,
            DaoLayerError::NotFound {
                entity: "email_verification",
                ..
            }
        ));
    }
}
