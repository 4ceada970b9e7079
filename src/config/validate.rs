use anyhow::{Result, bail};

use super::AppConfig;

const MIN_SECRET_LEN: usize = 32;

pub fn validate(cfg: &AppConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if cfg.general.host.trim().is_empty() {
        errors.push("general.host must not be empty".to_string());
    }

    if let Some(database) = cfg.database.as_ref() {
        if database.url.trim().is_empty() {
            errors.push("database.url must not be empty".to_string());
        }

        if database.min_idle > database.max_connections {
            errors.push(format!(
                "database.min_idle ({}) must be <= database.max_connections ({})",
                database.min_idle, database.max_connections
            ));
        }
    }

    let auth = &cfg.auth;
    if auth.access_secret.len() < MIN_SECRET_LEN {
        errors.push(format!(
            "auth.access_secret must be at least {MIN_SECRET_LEN} bytes"
        ));
    }
    if auth.refresh_secret.len() < MIN_SECRET_LEN {
        errors.push(format!(
            "auth.refresh_secret must be at least {MIN_SECRET_LEN} bytes"
        ));
    }
    if !auth.access_secret.is_empty() && auth.access_secret == auth.refresh_secret {
        errors.push("auth.access_secret and auth.refresh_secret must differ".to_string());
    }
    if auth.access_ttl_secs == 0 {
        errors.push("auth.access_ttl_secs must be > 0".to_string());
    }
    if auth.refresh_ttl_days == 0 {
        errors.push("auth.refresh_ttl_days must be > 0".to_string());
    }
    if let Some(admin) = auth.admin.as_ref() {
        if admin.user_id.trim().is_empty() {
            errors.push("auth.admin.user_id must not be empty".to_string());
        }
        if admin.password.len() < 8 {
            errors.push("auth.admin.password must be at least 8 characters".to_string());
        }
    }

    let session = &cfg.session;
    for (key, path) in [
        ("session.login_path", &session.login_path),
        ("session.signup_path", &session.signup_path),
        ("session.home_path", &session.home_path),
        ("session.refresh_cookie_path", &session.refresh_cookie_path),
    ] {
        if !path.starts_with('/') {
            errors.push(format!("{key} must start with '/'"));
        }
    }
    if session
        .protected_prefixes
        .iter()
        .any(|prefix| !prefix.starts_with('/') || prefix == "/")
    {
        errors.push("session.protected_prefixes entries must be non-root paths".to_string());
    }
    if session.is_protected(&session.login_path) {
        errors.push("session.login_path must not be protected".to_string());
    }
    if session.refresh_timeout_ms == 0 {
        errors.push("session.refresh_timeout_ms must be > 0".to_string());
    }
    if let Some(base) = session.auth_base_url.as_deref()
        && url::Url::parse(base).is_err()
    {
        errors.push("session.auth_base_url must be an absolute URL".to_string());
    }

    if errors.is_empty() {
        return Ok(());
    }

    bail!("invalid app config:\n- {}", errors.join("\n- "))
}
