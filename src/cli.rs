use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::AppError;
use crate::ports::{BillingRepository, FulfillmentRecord, PaymentProvider};
use crate::use_cases::FulfillPayment;

#[derive(Parser)]
#[command(name = "crater-payments")]
#[command(about = "Crater Payments - Stripe checkout and webhook reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration and run startup validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show the transaction and payment recorded for a checkout session
    Show {
        #[arg(value_name = "SESSION_ID")]
        session_id: String,
    },

    /// Re-run fulfillment for a recorded session whose webhook was lost
    Fulfill {
        #[arg(value_name = "SESSION_ID")]
        session_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(repository: &dyn BillingRepository, session_id: &str) -> anyhow::Result<()> {
    let tx = repository
        .find_transaction(session_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", session_id))?;

    println!("Transaction {}", tx.transaction_id);
    println!("  Id:        {}", tx.id);
    println!("  Type:      {}", tx.kind);
    println!("  Status:    {}", tx.status);
    println!("  Invoice:   {}", tx.invoice_id);
    println!("  Company:   {}", tx.company_id);
    println!("  Date:      {}", tx.transaction_date);

    match repository
        .find_payment_for_transaction(tx.id)
        .await
        .map_err(AppError::from)?
    {
        Some(payment) => {
            println!("Payment {}", payment.payment_number);
            println!("  Amount:    {}", payment.amount);
            println!("  Base:      {}", payment.base_amount);
            println!("  Date:      {}", payment.payment_date);
        }
        None => println!("No payment recorded"),
    }

    Ok(())
}

pub async fn handle_tx_fulfill(fulfill: &FulfillPayment, session_id: &str) -> anyhow::Result<()> {
    match fulfill.fulfill_session(session_id).await? {
        FulfillmentRecord::Fulfilled { payment, .. } => {
            tracing::info!(session_id, payment_number = %payment.payment_number, "Session fulfilled from CLI");
            println!(
                "Session {} fulfilled: payment {} for {}",
                session_id, payment.payment_number, payment.amount
            );
        }
        FulfillmentRecord::AlreadyFulfilled { payment, .. } => {
            let number = payment
                .map(|p| p.payment_number)
                .unwrap_or_else(|| "-".to_string());
            println!("Session {} was already fulfilled (payment {})", session_id, number);
        }
    }

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(
    config: &Config,
    provider: Option<&dyn PaymentProvider>,
) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  App URL: {}", config.app_url);
    println!("  Stripe API Base: {}", config.stripe.api_base);
    println!("  Stripe Secret Key: {}", mask_secret(config.stripe.secret_key.as_deref()));
    println!(
        "  Stripe Webhook Secret: {}",
        mask_secret(config.stripe.webhook_secret.as_deref())
    );
    println!("  Stripe Timeout: {}s", config.stripe.timeout.as_secs());
    println!(
        "  Webhook Tolerance: {}s",
        config.stripe.webhook_tolerance.as_secs()
    );
    println!(
        "  Payment Method Types: {}",
        config.stripe.payment_method_types.join(", ")
    );
    println!("  Admin API Key: {}", mask_secret(config.admin_api_key.as_deref()));
    println!("  Log Format: {:?}", config.log_format);

    let pool = crate::db::create_pool(config).await?;
    let report = crate::startup::validate_environment(config, &pool, provider).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    tracing::info!("Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

/// Keeps a recognizable prefix such as `sk_test_`.
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.len() <= 8 => "****".to_string(),
        Some(s) => {
            let prefix: String = s.chars().take(8).collect();
            format!("{}****", prefix)
        }
    }
}
