use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "terms")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub version: String,
    pub status: String,
    pub effective_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub content_html: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub content_markdown: Option<String>,
    #[sea_orm(default_expr = "Expr::current_timestamp()")]
    pub created_at: DateTimeWithTimeZone,
    #[sea_orm(default_expr = "Expr::current_timestamp()")]
    pub updated_at: DateTimeWithTimeZone,
    #[sea_orm(has_many)]
    pub consents: HasMany<super::user_consent::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
