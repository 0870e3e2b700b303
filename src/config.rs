use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,

    // Rate limiting, 0 disables the limiter
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub cors_origin: String,

    // Justification uploads
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,

    pub log_dir: String,
    pub run_migrations: bool,
    pub db_max_connections: u32,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
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
            access_token_ttl: or_default("ACCESS_TOKEN_TTL", 900)?, // 15 min

            rate_login_per_min: or_default("RATE_LOGIN_PER_MIN", 60)?,
            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: or_default("API_PREFIX", "/api/v1".to_string())?,
            cors_origin: or_default("CORS_ORIGIN", "http://localhost:4200".to_string())?,

            upload_dir: or_default("UPLOAD_DIR", PathBuf::from("uploads"))?,
            max_upload_bytes: or_default("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,

            log_dir: or_default("LOG_DIR", "logs".to_string())?,
            run_migrations: or_default("RUN_MIGRATIONS", true)?,
            db_max_connections: or_default("DB_MAX_CONNECTIONS", 10)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            database_url: "mysql://unused".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            rate_login_per_min: 0,
            rate_protected_per_min: 0,
            api_prefix: "/api/v1".to_string(),
            cors_origin: "http://localhost:4200".to_string(),
            upload_dir,
            max_upload_bytes: 1024,
            log_dir: "logs".to_string(),
            run_migrations: false,
            db_max_connections: 1,
        }
    }
}
