use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::types::{TokenPair, UserSummary},
    edge::cookies::{
        ACCESS_COOKIE, CookieSettings, DEVICE_COOKIE, REFRESH_COOKIE, append_set_cookies,
        bearer_token, read_cookie,
    },
    error::AppError,
    response::{ApiResult, JsonApiResponse},
    services::{
        ServiceContext,
        auth_service::{DeviceInfo, SignupRequest},
        user_service::UserCandidate,
    },
    state::AppState,
};

const MAX_DEVICE_ID_LEN: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    #[serde(alias = "loginId")]
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub consents: Vec<ConsentBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentBody {
    pub terms_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    #[serde(alias = "loginId")]
    pub user_id: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutBody {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequestBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailVerifyBody {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub ok: bool,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequestResponse {
    pub ok: bool,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct EmailVerifyResponse {
    pub ok: bool,
    pub verified: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/email/request", post(request_email_code))
        .route("/email/verify", post(verify_email_code))
        .with_state(state)
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupBody>,
) -> ApiResult<SignupResponse> {
    let service = state.services().auth(&state.tokens);
    let user_id = service
        .signup_and_consent(SignupRequest {
            candidate: UserCandidate {
                user_id: body.user_id,
                name: body.name,
                phone: body.phone,
                password: body.password,
                email: body.email,
            },
            terms_ids: body.consents.into_iter().map(|c| c.terms_id).collect(),
        })
        .await?;
    JsonApiResponse::ok(SignupResponse { ok: true, user_id })
}

async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<Response, AppError> {
    let cookies = CookieSettings::from_config(&state.config);
    let (device_id, fresh_device) = resolve_device_id(body.device_id.as_deref(), &headers)?;

    let service = ServiceContext::from_state(state.as_ref()).auth(&state.tokens);
    let result = service
        .login(
            &body.user_id,
            &body.password,
            &DeviceInfo {
                device_id: device_id.clone(),
                device_type: body.device_type,
            },
        )
        .await?;

    let mut set_cookies = cookies.session_cookies(&result.tokens, &result.user.name)?;
    if fresh_device {
        set_cookies.push(cookies.device(&device_id)?);
    }
    let payload = JsonApiResponse::ok(LoginResponse {
        user: result.user,
        access_token: result.tokens.access_token,
        refresh_token: result.tokens.refresh_token,
    })?;
    Ok(with_cookies(payload, set_cookies))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshBody>>,
) -> Result<Response, AppError> {
    let presented = body
        .and_then(|Json(body)| body.refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE))
        .ok_or_else(|| AppError::unauthorized("Missing refresh token"))?;

    let pair = state.local_refresh.ensure_refreshed(&presented).await?;
    let claims = state.tokens.verify_access(&pair.access_token)?;
    let set_cookies =
        CookieSettings::from_config(&state.config).session_cookies(&pair, &claims.name)?;

    Ok(with_cookies(JsonApiResponse::<TokenPair>::ok(pair)?, set_cookies))
}

/// Cookies are cleared whether or not a session could be identified.
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<LogoutBody>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let refresh = body
        .refresh_token
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE));
    let access = body
        .access_token
        .or_else(|| bearer_token(&headers))
        .or_else(|| read_cookie(&headers, ACCESS_COOKIE));

    let cleared = CookieSettings::from_config(&state.config).cleared();
    let outcome = state
        .services()
        .auth(&state.tokens)
        .logout(refresh.as_deref(), access.as_deref())
        .await
        .and_then(|()| JsonApiResponse::ok(OkResponse { ok: true }));

    match outcome {
        Ok(payload) => with_cookies(payload, cleared),
        Err(err) => {
            let mut response = err.into_response();
            append_set_cookies(response.headers_mut(), cleared);
            response
        }
    }
}

async fn request_email_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailRequestBody>,
) -> ApiResult<EmailRequestResponse> {
    let requested = state
        .services()
        .email_verification(state.mailer.clone())
        .request_code(&body.email)
        .await?;
    JsonApiResponse::ok(EmailRequestResponse {
        ok: true,
        expires_in: requested.expires_in,
    })
}

async fn verify_email_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailVerifyBody>,
) -> ApiResult<EmailVerifyResponse> {
    state
        .services()
        .email_verification(state.mailer.clone())
        .verify_code(&body.email, &body.code)
        .await?;
    JsonApiResponse::ok(EmailVerifyResponse {
        ok: true,
        verified: true,
    })
}

/// Body value, then the `device_id` cookie, then a new uuid. The flag is
/// true when the id was minted here and still needs its cookie.
fn resolve_device_id(
    requested: Option<&str>,
    headers: &HeaderMap,
) -> Result<(String, bool), AppError> {
    let provided = requested
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| read_cookie(headers, DEVICE_COOKIE));

    match provided {
        Some(id) => {
            validate_device_id(&id)?;
            Ok((id, false))
        }
        None => Ok((Uuid::new_v4().to_string(), true)),
    }
}

fn validate_device_id(id: &str) -> Result<(), AppError> {
    let well_formed = id.len() <= MAX_DEVICE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !well_formed {
        return Err(AppError::validation("Invalid deviceId"));
    }
    Ok(())
}

fn with_cookies<T: Serialize>(payload: JsonApiResponse<T>, cookies: Vec<HeaderValue>) -> Response {
    let mut response = payload.into_response();
    append_set_cookies(response.headers_mut(), cookies);
    response
}
