use sea_orm::entity::prelude::*;

/// Immutable record of the exact terms snapshot a member agreed to at signup.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_consents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique_key = "user_terms")]
    pub user_id: String,
    #[sea_orm(unique_key = "user_terms")]
    pub terms_id: i64,
    pub terms_version: String,
    #[sea_orm(column_type = "Text")]
    pub snapshot: String,
    pub content_hash: String,
    pub agreed_at: DateTimeWithTimeZone,
    #[sea_orm(belongs_to, from = "user_id", to = "user_id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,
    #[sea_orm(belongs_to, from = "terms_id", to = "id", on_delete = "Restrict")]
    pub terms: HasOne<super::terms::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
