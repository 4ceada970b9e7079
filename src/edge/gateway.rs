use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::{
    auth::types::TokenPair, error::AppError, routes::entry::API_PREFIX,
    services::auth_service::AuthService,
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Where the edge sends refresh tokens to be rotated.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError>;
}

/// Rotates in-process against the auth service.
pub struct LocalAuthGateway {
    auth: AuthService,
}

impl LocalAuthGateway {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl AuthGateway for LocalAuthGateway {
    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.auth.rotate(refresh_token).await
    }
}

/// Rotates by calling the refresh endpoint of a remote auth server.
pub struct HttpAuthGateway {
    client: Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct Envelope {
    message: Option<String>,
    data: Option<TokenPair>,
}

impl HttpAuthGateway {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(base_url)?.join(&format!("{API_PREFIX}/auth/refresh"))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let response = self
            .client
            .post(self.endpoint.as_str())
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, timeout = err.is_timeout(), "auth server unreachable");
                AppError::upstream("Auth server unavailable")
            })?;

        let status = response.status();
        let envelope: Option<Envelope> = response.json().await.ok();
        let message = envelope
            .as_ref()
            .and_then(|body| body.message.clone())
            .unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::unauthorized(message)),
            status if status.is_success() => envelope
                .and_then(|body| body.data)
                .ok_or_else(|| AppError::upstream("Auth server returned no tokens")),
            status => {
                tracing::warn!(status = status.as_u16(), %message, "auth server refresh failed");
                Err(AppError::upstream("Auth server refresh failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::{AuthGateway, HttpAuthGateway};
    use crate::error::AppError;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server should run");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn successful_refresh_returns_pair() {
        let router = Router::new().route(
            "/api/v1/auth/refresh",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "status": 200,
                    "message": "ok",
                    "data": {
                        "accessToken": "new-access",
                        "refreshToken": format!("{}-next", body["refreshToken"].as_str().unwrap_or_default()),
                    }
                }))
            }),
        );
        let base = serve(router).await;
        let gateway =
            HttpAuthGateway::new(&base, Duration::from_secs(2)).expect("gateway should build");

        let pair = gateway.rotate("old").await.expect("refresh should succeed");
        assert_eq!(pair.access_token, "new-access");
        assert_eq!(pair.refresh_token, "old-next");
    }

    #[tokio::test]
    async fn rejected_refresh_is_unauthorized() {
        let router = Router::new().route(
            "/api/v1/auth/refresh",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"status": 401, "message": "Invalid refresh token", "data": null})),
                )
            }),
        );
        let base = serve(router).await;
        let gateway =
            HttpAuthGateway::new(&base, Duration::from_secs(2)).expect("gateway should build");

        let err = gateway.rotate("old").await.expect_err("refresh should fail");
        assert_eq!(err, AppError::unauthorized("Invalid refresh token"));
    }

    #[tokio::test]
    async fn slow_server_is_an_upstream_error() {
        let router = Router::new().route(
            "/api/v1/auth/refresh",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                StatusCode::OK
            }),
        );
        let base = serve(router).await;
        let gateway =
            HttpAuthGateway::new(&base, Duration::from_millis(50)).expect("gateway should build");

        let err = gateway.rotate("old").await.expect_err("refresh should time out");
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
