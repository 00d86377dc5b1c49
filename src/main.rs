use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crater_payments::adapters::PostgresBillingRepository;
use crater_payments::cli::{Cli, Commands, DbCommands, TxCommands};
use crater_payments::config::{Config, LogFormat};
use crater_payments::ports::{BillingRepository, PaymentProvider};
use crater_payments::stripe::StripeClient;
use crater_payments::{cli, cors_layer, create_app, db, secrets, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let mut config = Config::from_env()?;

    init_tracing(config.log_format);

    secrets::load_into(&mut config).await?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => {
            let provider = stripe_client(&config);
            cli::handle_config_validate(&config, provider.as_ref().map(|p| p as &dyn PaymentProvider))
                .await
        }
        Commands::Tx(command) => {
            let pool = db::create_pool(&config).await?;
            let repository: Arc<dyn BillingRepository> = Arc::new(
                PostgresBillingRepository::new(pool)
                    .with_invoice_mailable_type(config.invoice_mailable_type.clone()),
            );
            let state = AppState::from_config(&config, repository.clone(), None);
            match command {
                TxCommands::Show { session_id } => {
                    cli::handle_tx_show(repository.as_ref(), &session_id).await
                }
                TxCommands::Fulfill { session_id } => {
                    cli::handle_tx_fulfill(&state.fulfill, &session_id).await
                }
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn stripe_client(config: &Config) -> Option<StripeClient> {
    config.stripe.secret_key.as_ref().map(|key| {
        StripeClient::with_options(
            config.stripe.api_base.clone(),
            key.clone(),
            config.stripe.timeout,
            3,
            60,
        )
    })
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let repository: Arc<dyn BillingRepository> = Arc::new(
        PostgresBillingRepository::new(pool)
            .with_invoice_mailable_type(config.invoice_mailable_type.clone()),
    );

    let provider: Option<Arc<dyn PaymentProvider>> = match stripe_client(&config) {
        Some(client) => {
            tracing::info!("Stripe client initialized with API base: {}", config.stripe.api_base);
            Some(Arc::new(client) as Arc<dyn PaymentProvider>)
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; checkout requests will fail");
            None
        }
    };

    let state = AppState::from_config(&config, repository, provider);
    if !state.webhooks.verifier().is_enforcing() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set; webhook signatures will NOT be verified");
    }

    let app = create_app(state).layer(cors_layer(&config.cors_allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("shutdown signal received");
}
