//! Set-Cookie builders and cookie/bearer extraction shared by the auth routes
//! and the session guard.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
};
use url::form_urlencoded;

use crate::{auth::types::TokenPair, config::AppConfig, error::AppError};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const DEVICE_COOKIE: &str = "device_id";
pub const SESSION_USER_COOKIE: &str = "session_user";

const DEVICE_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SameSite {
    Lax,
    Strict,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
        }
    }
}

struct CookieSpec<'a> {
    name: &'a str,
    path: &'a str,
    http_only: bool,
    same_site: SameSite,
    max_age: i64,
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    secure: bool,
    refresh_path: String,
    access_max_age: i64,
    refresh_max_age: i64,
}

impl CookieSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            secure: cfg.session.cookie_secure,
            refresh_path: cfg.session.refresh_cookie_path.clone(),
            access_max_age: i64::try_from(cfg.auth.access_ttl_secs).unwrap_or(i64::MAX),
            refresh_max_age: i64::try_from(cfg.auth.refresh_ttl_secs()).unwrap_or(i64::MAX),
        }
    }

    fn access_spec(&self, max_age: i64) -> CookieSpec<'_> {
        CookieSpec {
            name: ACCESS_COOKIE,
            path: "/",
            http_only: true,
            same_site: SameSite::Lax,
            max_age,
        }
    }

    fn refresh_spec(&self, max_age: i64) -> CookieSpec<'_> {
        CookieSpec {
            name: REFRESH_COOKIE,
            path: &self.refresh_path,
            http_only: true,
            same_site: SameSite::Strict,
            max_age,
        }
    }

    fn session_user_spec(&self, max_age: i64) -> CookieSpec<'_> {
        CookieSpec {
            name: SESSION_USER_COOKIE,
            path: "/",
            http_only: false,
            same_site: SameSite::Lax,
            max_age,
        }
    }

    /// Access, refresh and display-name cookies for a freshly issued pair.
    pub fn session_cookies(
        &self,
        tokens: &TokenPair,
        display_name: &str,
    ) -> Result<Vec<HeaderValue>, AppError> {
        let encoded_name: String = form_urlencoded::byte_serialize(display_name.as_bytes()).collect();
        Ok(vec![
            self.build(&self.access_spec(self.access_max_age), &tokens.access_token)?,
            self.build(&self.refresh_spec(self.refresh_max_age), &tokens.refresh_token)?,
            self.build(&self.session_user_spec(self.refresh_max_age), &encoded_name)?,
        ])
    }

    pub fn device(&self, device_id: &str) -> Result<HeaderValue, AppError> {
        self.build(
            &CookieSpec {
                name: DEVICE_COOKIE,
                path: "/",
                http_only: false,
                same_site: SameSite::Lax,
                max_age: DEVICE_MAX_AGE_SECS,
            },
            device_id,
        )
    }

    /// Expires the access, refresh and display-name cookies. The device
    /// cookie survives logout.
    pub fn cleared(&self) -> Vec<HeaderValue> {
        [
            self.access_spec(0),
            self.refresh_spec(0),
            self.session_user_spec(0),
        ]
        .iter()
        .filter_map(|spec| self.build(spec, "").ok())
        .collect()
    }

    fn build(&self, spec: &CookieSpec<'_>, value: &str) -> Result<HeaderValue, AppError> {
        let mut cookie = format!(
            "{}={value}; Path={}; SameSite={}; Max-Age={}",
            spec.name,
            spec.path,
            spec.same_site.as_str(),
            spec.max_age
        );
        if spec.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|err| {
            tracing::error!(error = %err, cookie = spec.name, "cookie value not representable");
            AppError::internal("Failed to build cookie")
        })
    }
}

pub fn append_set_cookies(headers: &mut HeaderMap, cookies: impl IntoIterator<Item = HeaderValue>) {
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
}

/// Value of the named cookie; empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}
