use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    /// Session lifetime in seconds (30 days by default)
    pub session_ttl: usize,
    /// A session older than this is re-issued on the next request
    pub session_update_age: usize,
    pub session_cookie_name: String,
    pub cookie_secure: bool,

    // Rate limiting
    pub rate_sign_in_per_min: u32,
    pub rate_api_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,
    pub run_migrations: bool,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,

            session_ttl: or_default("SESSION_TTL", 30 * 24 * 60 * 60)?, // 30 days
            session_update_age: or_default("SESSION_UPDATE_AGE", 24 * 60 * 60)?, // 1 day
            session_cookie_name: or_default("SESSION_COOKIE_NAME", "taskbit_session".to_string())?,
            cookie_secure: or_default("COOKIE_SECURE", false)?,

            rate_sign_in_per_min: or_default("RATE_SIGN_IN_PER_MIN", 20)?,
            rate_api_per_min: or_default("RATE_API_PER_MIN", 1000)?,

            api_prefix: or_default("API_PREFIX", "/api".to_string())?,
            log_dir: or_default("LOG_DIR", "logs".to_string())?,
            run_migrations: or_default("RUN_MIGRATIONS", false)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/taskbit_test".into(),
            jwt_secret: "test-secret-that-is-long-enough".into(),
            server_addr: "127.0.0.1:0".into(),
            session_ttl: 30 * 24 * 60 * 60,
            session_update_age: 24 * 60 * 60,
            session_cookie_name: "taskbit_session".into(),
            cookie_secure: false,
            rate_sign_in_per_min: 20,
            rate_api_per_min: 1000,
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            run_migrations: false,
        }
    }
}
