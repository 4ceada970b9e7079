//! Minimal server-rendered pages. Access control for the member and admin
//! areas happens in the session guard; these handlers only read the claims
//! it leaves behind.

use std::sync::Arc;

use askama::Template;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use url::form_urlencoded;

use crate::{
    auth::types::{AdminRole, TermsStatus, UserSummary},
    db::dao::DaoContext,
    edge::cookies::{SESSION_USER_COOKIE, read_cookie},
    error::AppError,
    middleware::{AuthGuard, AuthRoleGuard},
    routes::API_PREFIX,
    state::AppState,
};

const SITE_NAME: &str = "Church Community";

type HtmlError = (StatusCode, Html<String>);

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    site_name: &'static str,
    display_name: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    site_name: &'static str,
    api_prefix: &'static str,
    next: String,
}

struct TermsItem {
    id: i64,
    title: String,
    version: String,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    site_name: &'static str,
    api_prefix: &'static str,
    terms: Vec<TermsItem>,
}

#[derive(Template)]
#[template(path = "members.html")]
struct MembersTemplate {
    site_name: &'static str,
    name: String,
}

#[derive(Template)]
#[template(path = "mypage.html")]
struct MyPageTemplate {
    site_name: &'static str,
    user: UserSummary,
}

#[derive(Template)]
#[template(path = "admin.html")]
struct AdminTemplate {
    site_name: &'static str,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page))
        .route("/signup", get(signup_page))
        .route("/members", get(members_page))
        .route("/mypage", get(my_page))
        .route("/admin", get(admin_page))
        .with_state(state)
}

async fn index(headers: HeaderMap) -> Result<Html<String>, HtmlError> {
    render(IndexTemplate {
        site_name: SITE_NAME,
        display_name: session_display_name(&headers),
    })
}

async fn login_page(Query(query): Query<LoginQuery>) -> Result<Html<String>, HtmlError> {
    render(LoginTemplate {
        site_name: SITE_NAME,
        api_prefix: API_PREFIX,
        next: safe_next(query.next.as_deref()),
    })
}

async fn signup_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, HtmlError> {
    let now = Utc::now().fixed_offset();
    let terms = DaoContext::new(&state.db)
        .terms()
        .list()
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to load terms for signup");
            html_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load terms")
        })?
        .into_iter()
        .filter(|terms| {
            terms.status == TermsStatus::Published.as_str() && terms.effective_at <= now
        })
        .map(|terms| TermsItem {
            id: terms.id,
            title: terms.title,
            version: terms.version,
        })
        .collect();

    render(SignupTemplate {
        site_name: SITE_NAME,
        api_prefix: API_PREFIX,
        terms,
    })
}

async fn members_page(claims: AuthGuard) -> Result<Html<String>, HtmlError> {
    render(MembersTemplate {
        site_name: SITE_NAME,
        name: claims.name,
    })
}

async fn my_page(
    State(state): State<Arc<AppState>>,
    claims: AuthGuard,
) -> Result<Html<String>, AppError> {
    let user = state
        .services()
        .user()
        .find_by_user_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("Member not found"))?;
    let rendered = MyPageTemplate {
        site_name: SITE_NAME,
        user: UserSummary::from(&user),
    }
    .render()
    .map_err(|_| AppError::internal("failed to render my page"))?;
    Ok(Html(rendered))
}

async fn admin_page(guard: AuthRoleGuard<AdminRole>) -> Result<Html<String>, HtmlError> {
    render(AdminTemplate {
        site_name: SITE_NAME,
        name: guard.claims.name,
    })
}

fn render<T: Template>(template: T) -> Result<Html<String>, HtmlError> {
    template
        .render()
        .map(Html)
        .map_err(|_| html_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to render page"))
}

fn html_error(status: StatusCode, message: &'static str) -> HtmlError {
    (status, Html(message.to_string()))
}

/// Only same-site absolute paths survive; anything else falls back to `/`.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn session_display_name(headers: &HeaderMap) -> Option<String> {
    let raw = read_cookie(headers, SESSION_USER_COOKIE)?;
    form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(name, _)| name.into_owned())
        .filter(|name| !name.is_empty())
}
