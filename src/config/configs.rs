use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{defaults, envconfig::EnvConfig, validate};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        <Self as EnvConfig>::from_env()
    }
}

impl EnvConfig for AppConfig {
    const LIST_KEYS: &'static [&'static str] = &["session.protected_prefixes"];

    fn validate(&self) -> Result<()> {
        validate::validate(self)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used when links to this site are handed to external parties.
    pub public_base_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            public_base_url: defaults::DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub rust_log: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: defaults::DEFAULT_RUST_LOG.to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_min_idle")]
    pub min_idle: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_days: u64,
    pub admin: Option<AdminSeedConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: defaults::DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_days: defaults::DEFAULT_REFRESH_TTL_DAYS,
            admin: None,
        }
    }
}

impl AuthConfig {
    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_days.saturating_mul(24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdminSeedConfig {
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub cookie_secure: bool,
    pub refresh_cookie_path: String,
    pub login_path: String,
    pub signup_path: String,
    pub home_path: String,
    pub protected_prefixes: Vec<String>,
    pub refresh_timeout_ms: u64,
    /// When set, the edge guard rotates tokens over HTTP instead of in-process.
    pub auth_base_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_secure: true,
            refresh_cookie_path: defaults::DEFAULT_REFRESH_COOKIE_PATH.to_string(),
            login_path: defaults::DEFAULT_LOGIN_PATH.to_string(),
            signup_path: defaults::DEFAULT_SIGNUP_PATH.to_string(),
            home_path: defaults::DEFAULT_HOME_PATH.to_string(),
            protected_prefixes: defaults::DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            refresh_timeout_ms: defaults::DEFAULT_REFRESH_TIMEOUT_MS,
            auth_base_url: None,
        }
    }
}

impl SessionConfig {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_auth_page(&self, path: &str) -> bool {
        path == self.login_path || path == self.signup_path
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    #[serde(default = "default_mail_sender")]
    pub sender: String,
    pub smtp_host: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

fn default_db_max_connections() -> u32 {
    defaults::DEFAULT_DB_MAX_CONNECTIONS
}

fn default_db_min_idle() -> u32 {
    defaults::DEFAULT_DB_MIN_IDLE
}

fn default_mail_sender() -> String {
    defaults::DEFAULT_MAIL_SENDER.to_string()
}
