use std::collections::HashSet;

use axum::{
    Router,
    body::{self, Body},
    http::{
        Request, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::Response,
};
use futures_util::future::join_all;
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

use church_auth::{
    auth::types::{ApprovalStatus, Role},
    routes::API_PREFIX,
    services::{ServiceContext, user_service::UserCandidate},
    test_helpers::{test_router, test_state},
};

async fn call(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

fn page(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn set_cookies(res: &Response) -> Vec<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|cookie| {
        let first = cookie.split(';').next()?;
        let (key, value) = first.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn location(res: &Response) -> &str {
    res.headers().get(LOCATION).unwrap().to_str().unwrap()
}

async fn text_body(res: Response) -> String {
    let body = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Router with one member, plus that member's login response data.
async fn logged_in(role: Role) -> (Router, Value) {
    let state = test_state().await;
    ServiceContext::new(&state.db)
        .user()
        .create_user(
            UserCandidate {
                user_id: "abc123".to_string(),
                name: "Kim Grace".to_string(),
                phone: "01012345678".to_string(),
                password: "Secret!1".to_string(),
                email: None,
            },
            role,
            ApprovalStatus::Approved,
        )
        .await
        .unwrap();
    let app = test_router(state);

    let res = call(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("{API_PREFIX}/auth/login"))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"userId": "abc123", "password": "Secret!1", "deviceId": "dev-1"})
                    .to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (app, json["data"].clone())
}

#[tokio::test]
async fn public_pages_need_no_session() {
    let app = test_router(test_state().await);

    let res = call(&app, page("/", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(text_body(res).await.contains("Log in"));
}

#[tokio::test]
async fn protected_page_without_cookies_redirects_with_next() {
    let app = test_router(test_state().await);

    let res = call(&app, page("/members?page=2", None)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&res),
        "/login?next=%2Fmembers%3Fpage%3D2"
    );
}

#[tokio::test]
async fn login_page_bounces_home_when_a_session_cookie_exists() {
    let app = test_router(test_state().await);

    let res = call(&app, page("/login", Some("refresh_token=whatever"))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/");

    let res = call(&app, page("/login?next=/members", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(text_body(res).await.contains("data-next="));
}

#[tokio::test]
async fn valid_access_cookie_passes() {
    let (app, data) = logged_in(Role::User).await;
    let access = data["accessToken"].as_str().unwrap();

    let res = call(&app, page("/members", Some(&format!("access_token={access}")))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookies(&res).is_empty());
    assert!(text_body(res).await.contains("Kim Grace"));
}

#[tokio::test]
async fn refresh_cookie_alone_renews_at_the_edge() {
    let (app, data) = logged_in(Role::User).await;
    let refresh = data["refreshToken"].as_str().unwrap();

    let res = call(
        &app,
        page(
            "/mypage",
            Some(&format!("access_token=expired-or-forged; refresh_token={refresh}")),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookies = set_cookies(&res);
    assert!(cookie_value(&cookies, "access_token").is_some());
    let renewed = cookie_value(&cookies, "refresh_token").unwrap();
    assert_ne!(renewed, refresh);
    assert!(text_body(res).await.contains("abc123"));

    // The presented refresh token was consumed by the renewal.
    let res = call(&app, page("/mypage", Some(&format!("refresh_token={refresh}")))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn failed_renewal_redirects_and_clears_cookies() {
    let (app, _data) = logged_in(Role::User).await;

    let res = call(&app, page("/members", Some("refresh_token=not-a-jwt"))).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/login?next=%2Fmembers");
    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 3);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn concurrent_renewals_share_one_rotation() {
    let (app, data) = logged_in(Role::User).await;
    let cookie = format!(
        "refresh_token={}",
        data["refreshToken"].as_str().unwrap()
    );

    let responses = join_all((0..5).map(|_| call(&app, page("/members", Some(&cookie))))).await;

    let mut issued = HashSet::new();
    for res in &responses {
        assert_eq!(res.status(), StatusCode::OK);
        issued.insert(cookie_value(&set_cookies(res), "refresh_token").unwrap());
    }
    assert_eq!(issued.len(), 1);
}

#[tokio::test]
async fn admin_page_requires_admin_role() {
    let (app, data) = logged_in(Role::User).await;
    let access = data["accessToken"].as_str().unwrap();
    let res = call(&app, page("/admin", Some(&format!("access_token={access}")))).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (app, data) = logged_in(Role::Admin).await;
    let access = data["accessToken"].as_str().unwrap();
    let res = call(&app, page("/admin", Some(&format!("access_token={access}")))).await;
    assert_eq!(res.status(), StatusCode::OK);
}
