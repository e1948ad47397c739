use anyhow::Context;
use std::path::PathBuf;

use crate::ingest::AuthorMatchPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub secret_key: String,
    pub token_ttl_days: i64,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub author_match_policy: AuthorMatchPolicy,
}

impl AppConfig {
    /// Reads the process environment. `.env` is expected to be loaded by the caller.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = std::env::var("SECRET_KEY").context("SECRET_KEY must be set in .env")?;
        if secret_key.is_empty() {
            anyhow::bail!("SECRET_KEY must not be empty");
        }

        let author_match_policy = if env_or("AUTHOR_MATCH_BARE_NAMES", false)? {
            AuthorMatchPolicy::BareName
        } else {
            AuthorMatchPolicy::EmailThenNameAffiliation
        };

        let max_upload_mb: usize = env_or("MAX_UPLOAD_MB", 20)?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://publications.db".to_string()),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
            secret_key,
            token_ttl_days: env_or("TOKEN_TTL_DAYS", 30)?,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            author_match_policy,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}
