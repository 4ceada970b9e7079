use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use url::form_urlencoded;

use crate::{
    auth::{jwt::TokenIssuer, types::AccessClaims},
    config::SessionConfig,
    edge::cookies::{
        ACCESS_COOKIE, CookieSettings, REFRESH_COOKIE, append_set_cookies, read_cookie,
    },
    error::AppError,
    state::AppState,
};

/// What the guard does with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Pass,
    Authorized(AccessClaims),
    Renew { refresh_token: String },
    RedirectHome,
    RedirectLogin { next: String },
}

/// Pure routing decision. `target` is the original path plus query.
pub fn decide(
    session: &SessionConfig,
    tokens: &TokenIssuer,
    path: &str,
    target: &str,
    access: Option<&str>,
    refresh: Option<&str>,
) -> GuardDecision {
    if session.is_auth_page(path) && (access.is_some() || refresh.is_some()) {
        return GuardDecision::RedirectHome;
    }
    if !session.is_protected(path) {
        return GuardDecision::Pass;
    }
    if let Some(claims) = access.and_then(|token| tokens.verify_access(token).ok()) {
        return GuardDecision::Authorized(claims);
    }
    match refresh {
        Some(token) => GuardDecision::Renew {
            refresh_token: token.to_string(),
        },
        None => GuardDecision::RedirectLogin {
            next: target.to_string(),
        },
    }
}

pub fn login_redirect_url(login_path: &str, next: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{login_path}?next={encoded}")
}

pub async fn session_guard(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = &state.config.session;
    let access = read_cookie(req.headers(), ACCESS_COOKIE);
    let refresh = read_cookie(req.headers(), REFRESH_COOKIE);
    let path = req.uri().path().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    match decide(
        session,
        &state.tokens,
        &path,
        &target,
        access.as_deref(),
        refresh.as_deref(),
    ) {
        GuardDecision::Pass => next.run(req).await,
        GuardDecision::Authorized(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        GuardDecision::RedirectHome => Redirect::to(&session.home_path).into_response(),
        GuardDecision::RedirectLogin { next: target } => {
            Redirect::to(&login_redirect_url(&session.login_path, &target)).into_response()
        }
        GuardDecision::Renew { refresh_token } => {
            let cookies = CookieSettings::from_config(&state.config);
            let renewed = state
                .refresh
                .ensure_refreshed(&refresh_token)
                .await
                .and_then(|pair| {
                    let claims = state.tokens.verify_access(&pair.access_token)?;
                    let set_cookies = cookies.session_cookies(&pair, &claims.name)?;
                    let bearer = HeaderValue::from_str(&format!("Bearer {}", pair.access_token))
                        .map_err(|_| AppError::internal("Invalid access token"))?;
                    Ok((claims, set_cookies, bearer))
                });

            match renewed {
                Ok((claims, set_cookies, bearer)) => {
                    tracing::debug!(user_id = %claims.sub, path = %path, "session renewed at edge");
                    req.headers_mut().insert(AUTHORIZATION, bearer);
                    req.extensions_mut().insert(claims);
                    let mut response = next.run(req).await;
                    append_set_cookies(response.headers_mut(), set_cookies);
                    response
                }
                Err(err) => {
                    tracing::info!(error = %err, path = %path, "session renewal failed");
                    let mut response =
                        Redirect::to(&login_redirect_url(&session.login_path, &target))
                            .into_response();
                    append_set_cookies(response.headers_mut(), cookies.cleared());
                    response
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardDecision, decide, login_redirect_url};
    use crate::{
        config::SessionConfig,
        test_helpers::{test_token_issuer, test_user_model},
    };

    #[test]
    fn public_paths_pass_untouched() {
        let session = SessionConfig::default();
        let issuer = test_token_issuer();

        assert_eq!(
            decide(&session, &issuer, "/", "/", None, None),
            GuardDecision::Pass
        );
        assert_eq!(
            decide(&session, &issuer, "/notices", "/notices", Some("junk"), None),
            GuardDecision::Pass
        );
    }

    #[test]
    fn auth_pages_bounce_when_a_cookie_is_present() {
        let session = SessionConfig::default();
        let issuer = test_token_issuer();

        assert_eq!(
            decide(&session, &issuer, "/login", "/login", None, Some("r")),
            GuardDecision::RedirectHome
        );
        assert_eq!(
            decide(&session, &issuer, "/signup", "/signup", None, None),
            GuardDecision::Pass
        );
    }

    #[test]
    fn protected_paths_need_a_valid_access_or_a_refresh() {
        let session = SessionConfig::default();
        let issuer = test_token_issuer();
        let access = issuer
            .issue_access_token(&test_user_model("abc123"), "dev-1")
            .expect("token should encode");

        assert!(matches!(
            decide(&session, &issuer, "/members", "/members", Some(&access), None),
            GuardDecision::Authorized(ref claims) if claims.sub == "abc123"
        ));
        assert_eq!(
            decide(&session, &issuer, "/members", "/members", Some("forged"), Some("r")),
            GuardDecision::Renew {
                refresh_token: "r".to_string()
            }
        );
        assert_eq!(
            decide(&session, &issuer, "/admin/users", "/admin/users?page=2", None, None),
            GuardDecision::RedirectLogin {
                next: "/admin/users?page=2".to_string()
            }
        );
    }

    #[test]
    fn login_redirect_encodes_next() {
        assert_eq!(
            login_redirect_url("/login", "/admin/users?page=2"),
            "/login?next=%2Fadmin%2Fusers%3Fpage%3D2"
        );
    }
}
