pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_RUST_LOG: &str = "info,tower_http=info,sqlx=warn";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_MIN_IDLE: u32 = 2;

pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_DAYS: u64 = 30;

pub const DEFAULT_REFRESH_COOKIE_PATH: &str = "/";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_SIGNUP_PATH: &str = "/signup";
pub const DEFAULT_HOME_PATH: &str = "/";
pub const DEFAULT_PROTECTED_PREFIXES: &[&str] = &["/members", "/mypage", "/admin"];
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_MAIL_SENDER: &str = "no-reply@localhost";
