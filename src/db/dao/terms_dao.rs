use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Set,
};

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::terms::{self, Entity as Terms};

#[derive(Debug, Clone)]
pub struct NewTerms {
    pub title: String,
    pub version: String,
    pub status: String,
    pub effective_at: DateTime<FixedOffset>,
    pub content_html: Option<String>,
    pub content_markdown: Option<String>,
}

#[derive(Clone)]
pub struct TermsDao {
    db: DatabaseConnection,
}

impl DaoBase for TermsDao {
    type Entity = Terms;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl TermsDao {
    /// Looks up terms on an arbitrary connection, typically the signup
    /// transaction.
    pub async fn find_by_id_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> DaoResult<Option<terms::Model>> {
        Terms::find_by_id(id)
            .one(conn)
            .await
            .map_err(DaoLayerError::from_db)
    }

    pub async fn list(&self) -> DaoResult<Vec<terms::Model>> {
        self.find_all(|query| query.order_by_asc(terms::Column::Id))
            .await
    }

    pub async fn create(&self, new_terms: NewTerms) -> DaoResult<terms::Model> {
        let now = Utc::now().fixed_offset();
        let model = terms::ActiveModel {
            title: Set(new_terms.title),
            version: Set(new_terms.version),
            status: Set(new_terms.status),
            effective_at: Set(new_terms.effective_at),
            content_html: Set(new_terms.content_html),
            content_markdown: Set(new_terms.content_markdown),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(&self.db).await.map_err(DaoLayerError::from_db)
    }
}
