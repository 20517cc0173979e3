use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

use crate::app::reminders::ReminderSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub run_migrations: bool,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub queue_endpoint: String,
    pub queue_region: String,
    pub queue_name: String,
    pub push_gateway_url: Url,
    pub push_gateway_key: Option<String>,
    pub push_timeout_seconds: u64,
    pub push_concurrency: usize,
    pub sweep_concurrency: usize,
    pub sweep_interval_seconds: u64,
    pub operational_timezone: Tz,
    pub prune_invalid_tokens: bool,
    pub practice_name: String,
    pub app_url: String,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            run_migrations: env_or_parse("RUN_MIGRATIONS", "true")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            queue_endpoint: env_or_err("QUEUE_ENDPOINT")?,
            queue_region: env_or("QUEUE_REGION", "fr-par"),
            queue_name: env_or_err("QUEUE_NAME")?,
            push_gateway_url: env_base_url("PUSH_GATEWAY_URL")?,
            push_gateway_key: std::env::var("PUSH_GATEWAY_KEY").ok(),
            push_timeout_seconds: env_or_parse("PUSH_TIMEOUT_SECONDS", "10")?,
            push_concurrency: env_or_parse("PUSH_CONCURRENCY", "8")?,
            sweep_concurrency: env_or_parse("SWEEP_CONCURRENCY", "4")?,
            sweep_interval_seconds: env_or_parse("SWEEP_INTERVAL_SECONDS", "3600")?,
            operational_timezone: env_or_parse("OPERATIONAL_TIMEZONE", "Europe/Madrid")?,
            prune_invalid_tokens: env_or_parse("PRUNE_INVALID_TOKENS", "true")?,
            practice_name: env_or("PRACTICE_NAME", "Ruiz Nutrición"),
            app_url: env_or("APP_URL", "https://nutricionapp-b7b7d.web.app"),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
        })
    }

    pub fn reminder_settings(&self) -> ReminderSettings {
        ReminderSettings {
            timezone: self.operational_timezone,
            practice_name: self.practice_name.clone(),
            app_url: self.app_url.clone(),
            push_concurrency: self.push_concurrency.max(1),
            sweep_concurrency: self.sweep_concurrency.max(1),
            prune_invalid_tokens: self.prune_invalid_tokens,
        }
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

/// Parses a base URL, forcing a trailing slash so relative joins keep the path.
fn env_base_url(key: &str) -> Result<Url> {
    let mut value = env_or_err(key)?;
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
