use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{
    auth::jwt::TokenIssuer,
    config::AppConfig,
    db::{
        connection,
        dao::{DaoContext, NewTerms},
        entities::{terms, user},
    },
    error::AppError,
    routes,
    services::mailer::{MailMessage, Mailer},
    state::AppState,
};

pub const TEST_ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";

/// Fresh in-memory SQLite with the schema synced. A single connection keeps
/// every query on the same database.
pub async fn sqlite_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");
    connection::prepare(&db).await.expect("prepare sqlite schema");
    db
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.access_secret = TEST_ACCESS_SECRET.to_string();
    cfg.auth.refresh_secret = TEST_REFRESH_SECRET.to_string();
    cfg.session.cookie_secure = false;
    cfg
}

pub fn test_token_issuer() -> TokenIssuer {
    TokenIssuer::new(&test_config().auth)
}

pub fn test_user_model(user_id: &str) -> user::Model {
    let now = Utc::now().fixed_offset();
    user::Model {
        user_id: user_id.to_string(),
        name: "Kim Grace".to_string(),
        phone: "01012345678".to_string(),
        email: None,
        password_hash: "unused".to_string(),
        role: "user".to_string(),
        approval_status: "pending".to_string(),
        enabled: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Debug, Clone)]
pub struct TermsSeed {
    pub title: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    /// Offset of `effective_at` from now; negative is already in effect.
    pub effective_in: Duration,
    pub html: Option<String>,
    pub markdown: Option<String>,
}

impl TermsSeed {
    pub fn published() -> Self {
        Self {
            title: "Terms of Service",
            version: "v1",
            status: "PUBLISHED",
            effective_in: Duration::days(-1),
            html: Some("<p>Members agree to the community rules.</p>".to_string()),
            markdown: None,
        }
    }
}

pub async fn seed_terms(db: &DatabaseConnection, seed: TermsSeed) -> terms::Model {
    DaoContext::new(db)
        .terms()
        .create(NewTerms {
            title: seed.title.to_string(),
            version: seed.version.to_string(),
            status: seed.status.to_string(),
            effective_at: (Utc::now() + seed.effective_in).fixed_offset(),
            content_html: seed.html,
            content_markdown: seed.markdown,
        })
        .await
        .expect("seed terms")
}

/// Keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<MailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

/// State over a fresh SQLite database with in-process token rotation.
pub async fn test_state() -> Arc<AppState> {
    AppState::new(test_config(), sqlite_db().await).expect("build test state")
}

/// Like [`test_state`] but with mail captured by the given mailer.
pub async fn test_state_with_mailer(mailer: Arc<RecordingMailer>) -> Arc<AppState> {
    let state = test_state().await;
    AppState::with_parts(
        state.config.clone(),
        state.db.clone(),
        state.tokens.clone(),
        state.refresh.clone(),
        state.local_refresh.clone(),
        mailer,
    )
}

pub fn test_router(state: Arc<AppState>) -> Router {
    routes::app(state)
}
