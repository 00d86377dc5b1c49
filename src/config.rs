use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use url::Url;

use crate::adapters::postgres_billing_repository::DEFAULT_INVOICE_MAILABLE_TYPE;
use crate::stripe::client::DEFAULT_API_BASE;
use crate::stripe::webhook::DEFAULT_TOLERANCE_SECS;

pub const DEFAULT_PAYMENT_METHOD_TYPES: [&str; 4] = ["card", "link", "cashapp", "us_bank_account"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
    pub webhook_tolerance: Duration,
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// `email_logs.mailable_type` stored for invoice emails.
    pub invoice_mailable_type: String,
    pub app_url: Url,
    pub stripe: StripeConfig,
    pub admin_api_key: Option<String>,
    pub cors_allowed_origins: AllowedOrigins,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let app_url = non_empty("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Config {
            server_port: parse_or(&non_empty, "SERVER_PORT", 3000)?,
            database_url: non_empty("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or(&non_empty, "DATABASE_MAX_CONNECTIONS", 5)?,
            invoice_mailable_type: non_empty("INVOICE_MAILABLE_TYPE")
                .unwrap_or_else(|| DEFAULT_INVOICE_MAILABLE_TYPE.to_string()),
            app_url: parse_app_url(&app_url)?,
            stripe: StripeConfig {
                secret_key: non_empty("STRIPE_SECRET_KEY"),
                webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
                api_base: non_empty("STRIPE_API_BASE")
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                timeout: Duration::from_secs(parse_or(&non_empty, "STRIPE_TIMEOUT_SECS", 30)?),
                webhook_tolerance: Duration::from_secs(parse_or(
                    &non_empty,
                    "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    DEFAULT_TOLERANCE_SECS,
                )?),
                payment_method_types: parse_payment_method_types(
                    non_empty("STRIPE_PAYMENT_METHOD_TYPES").as_deref(),
                ),
            },
            admin_api_key: non_empty("ADMIN_API_KEY"),
            cors_allowed_origins: parse_allowed_origins(
                &non_empty("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            )?,
            log_format: parse_log_format(non_empty("LOG_FORMAT").as_deref())?,
        })
    }

    pub fn is_stripe_configured(&self) -> bool {
        self.stripe.secret_key.is_some()
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_app_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("APP_URL is not a valid URL: {}", raw))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("APP_URL must use http or https");
    }
    if url.cannot_be_a_base() {
        anyhow::bail!("APP_URL must be an absolute base URL");
    }
    Ok(url)
}

fn parse_payment_method_types(raw: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();

    if parsed.is_empty() {
        DEFAULT_PAYMENT_METHOD_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        parsed
    }
}

fn parse_allowed_origins(raw: &str) -> Result<AllowedOrigins> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedOrigins::Any);
    }

    let origins: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        anyhow::bail!("CORS_ALLOWED_ORIGINS must be '*' or a comma-separated list of origins");
    }

    Ok(AllowedOrigins::List(origins))
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("text") => Ok(LogFormat::Text),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
    }
}
