use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;

use crate::{
    auth::jwt::TokenIssuer,
    config::AppConfig,
    edge::{AuthGateway, HttpAuthGateway, LocalAuthGateway, RefreshCoordinator},
    services::{
        ServiceContext,
        mailer::{LogMailer, Mailer},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub tokens: TokenIssuer,
    /// Renewal used by the session guard; may call a remote auth server.
    pub refresh: Arc<RefreshCoordinator>,
    /// Renewal used by the refresh endpoint; always rotates in-process so
    /// the endpoint never calls back into itself.
    pub local_refresh: Arc<RefreshCoordinator>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wires the edge to rotate in-process, or over HTTP when
    /// `session.auth_base_url` is set.
    pub fn new(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<Arc<Self>> {
        let tokens = TokenIssuer::new(&config.auth);
        let timeout = Duration::from_millis(config.session.refresh_timeout_ms);
        let local: Arc<dyn AuthGateway> = Arc::new(LocalAuthGateway::new(
            ServiceContext::new(&db).auth(&tokens),
        ));
        let local_refresh = Arc::new(RefreshCoordinator::new(local, timeout));
        let refresh = match config.session.auth_base_url.as_deref() {
            Some(base_url) => {
                let gateway = HttpAuthGateway::new(base_url, timeout)?;
                tracing::info!(endpoint = %gateway.endpoint(), "edge refresh via remote auth server");
                Arc::new(RefreshCoordinator::new(Arc::new(gateway), timeout))
            }
            None => Arc::clone(&local_refresh),
        };
        let sender = config
            .mail
            .as_ref()
            .map(|mail| mail.sender.clone())
            .unwrap_or_else(|| crate::config::defaults::DEFAULT_MAIL_SENDER.to_string());

        Ok(Self::with_parts(
            config,
            db,
            tokens,
            refresh,
            local_refresh,
            Arc::new(LogMailer::new(sender)),
        ))
    }

    pub fn with_parts(
        config: AppConfig,
        db: DatabaseConnection,
        tokens: TokenIssuer,
        refresh: Arc<RefreshCoordinator>,
        local_refresh: Arc<RefreshCoordinator>,
        mailer: Arc<dyn Mailer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            tokens,
            refresh,
            local_refresh,
            mailer,
        })
    }

    pub fn services(&self) -> ServiceContext {
        ServiceContext::from_state(self)
    }
}
