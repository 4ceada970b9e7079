pub mod configs;
pub mod defaults;
pub mod envconfig;
pub mod validate;

pub use configs::{
    AdminSeedConfig, AppConfig, AuthConfig, DatabaseConfig, GeneralConfig, LogFormat,
    LoggingConfig, MailConfig, SessionConfig,
};
pub use envconfig::EnvConfig;
