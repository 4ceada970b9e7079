use chrono::{DateTime, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, QueryFilter, QueryOrder,
    Set,
};
use uuid::Uuid;

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::user_consent::{self, Entity as UserConsent};

#[derive(Debug, Clone)]
pub struct NewConsent {
    pub user_id: String,
    pub terms_id: i64,
    pub terms_version: String,
    pub snapshot: String,
    pub content_hash: String,
    pub agreed_at: DateTime<FixedOffset>,
}

#[derive(Clone)]
pub struct ConsentDao {
    db: DatabaseConnection,
}

impl DaoBase for ConsentDao {
    type Entity = UserConsent;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl ConsentDao {
    /// Consents are written once, inside the signup transaction.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        consent: NewConsent,
    ) -> DaoResult<user_consent::Model> {
        let model = user_consent::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(consent.user_id),
            terms_id: Set(consent.terms_id),
            terms_version: Set(consent.terms_version),
            snapshot: Set(consent.snapshot),
            content_hash: Set(consent.content_hash),
            agreed_at: Set(consent.agreed_at),
        };
        model.insert(conn).await.map_err(DaoLayerError::from_db)
    }

    pub async fn list_for_user(&self, user_id: &str) -> DaoResult<Vec<user_consent::Model>> {
        let user_id = user_id.to_string();
        self.find_all(move |query| {
            query
                .filter(user_consent::Column::UserId.eq(user_id))
                .order_by_asc(user_consent::Column::TermsId)
        })
        .await
    }
}
