use crate::config::Config;
use crate::ports::PaymentProvider;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    /// `None` when no provider secret key is configured.
    pub stripe: Option<bool>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.stripe.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        match self.stripe {
            Some(ok) => println!("Stripe Connectivity:   {}", status(ok)),
            None => println!("Stripe Connectivity:   SKIPPED (not configured)"),
        }

        if !self.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &self.warnings {
                println!("  ! {}", warning);
            }
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  x {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    provider: Option<&dyn PaymentProvider>,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        stripe: None,
        errors: Vec::new(),
        warnings: config_warnings(config),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Some(provider) = provider {
        match provider.ping().await {
            Ok(()) => report.stripe = Some(true),
            Err(e) => {
                report.stripe = Some(false);
                report.errors.push(format!("Stripe: {}", e));
            }
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    url::Url::parse(&config.stripe.api_base).context("STRIPE_API_BASE is not a valid URL")?;

    Ok(())
}

/// Settings that are legal but unsafe or incomplete for production.
pub fn config_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if !config.is_stripe_configured() {
        warnings.push("STRIPE_SECRET_KEY is not set; checkout is disabled".to_string());
    }
    if config.stripe.webhook_secret.is_none() {
        warnings.push(
            "STRIPE_WEBHOOK_SECRET is not set; webhook signatures are NOT verified".to_string(),
        );
    }
    if config.admin_api_key.is_none() {
        warnings.push("ADMIN_API_KEY is not set; transaction routes are closed".to_string());
    }
    warnings
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
