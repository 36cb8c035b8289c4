use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub s3_endpoint: String,
    pub s3_public_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub upload_max_bytes: usize,
    pub upload_max_width: u32,
    pub upload_max_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub token_ttl_hours: u64,
    pub relationship_lookup_timeout_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let relationship_lookup_timeout_ms: u64 =
            env_or_parse("RELATIONSHIP_LOOKUP_TIMEOUT_MS", "500")?;
        if relationship_lookup_timeout_ms == 0 {
            return Err(anyhow!("invalid RELATIONSHIP_LOOKUP_TIMEOUT_MS: must be positive"));
        }

        Ok(Self {
            http_addr,
            database_url: env_or_err("DATABASE_URL")?,
            s3_endpoint: env_or_err("S3_ENDPOINT")?,
            s3_public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
            s3_region: env_or("S3_REGION", "fr-par"),
            s3_bucket: env_or_err("S3_BUCKET")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "10240001")?,
            upload_max_width: env_or_parse("UPLOAD_MAX_WIDTH", "6000")?,
            upload_max_height: env_or_parse("UPLOAD_MAX_HEIGHT", "3000")?,
            thumbnail_width: env_or_parse("THUMBNAIL_WIDTH", "150")?,
            thumbnail_height: env_or_parse("THUMBNAIL_HEIGHT", "150")?,
            token_ttl_hours: env_or_parse("TOKEN_TTL_HOURS", "720")?,
            relationship_lookup_timeout_ms,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
