//! Subscription Billing API Server
//!
//! Serves the webhook, subscriber and operator APIs and runs the billing
//! scheduler in the background until interrupted.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subscription_billing::adapters::auth::JwtAdminTokenValidator;
use subscription_billing::adapters::crypto::AesGcmCredentialCipher;
use subscription_billing::adapters::gateways::{GatewayEndpoints, HttpGatewayRegistry};
use subscription_billing::adapters::http::api_router;
use subscription_billing::adapters::notify::LoggingNotifier;
use subscription_billing::app::{BillingApp, Collaborators, Repositories};
use subscription_billing::config::{AppConfig, LogFormat};
use subscription_billing::domain::foundation::{Clock, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    tracing::info!(
        "Starting subscription billing v{} ({:?})",
        env!("CARGO_PKG_VERSION"),
        config.server.environment
    );
    config.validate()?;

    let repos = match &config.database {
        Some(database) => {
            tracing::info!("Connecting to database...");
            let pool = database.connect().await?;
            if database.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database migrations applied");
            }
            Repositories::postgres(pool)
        }
        None => {
            tracing::warn!("No database configured; state is kept in memory and lost on restart");
            Repositories::in_memory()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cipher = Arc::new(AesGcmCredentialCipher::new(&config.billing.encryption_key_bytes()?));
    let gateways = Arc::new(HttpGatewayRegistry::new(
        cipher.clone(),
        clock.clone(),
        GatewayEndpoints {
            card_network: config.billing.card_network_api_url.clone(),
            wallet: config.billing.wallet_api_url.clone(),
        },
        config.billing.webhook_tolerance_secs,
    ));
    let admin_validator = Arc::new(JwtAdminTokenValidator::new(
        config.admin.jwt_secret_bytes(),
        &config.admin.jwt_issuer,
        config.admin.required_role.clone(),
    ));
    let notifier = Arc::new(LoggingNotifier);

    let app = BillingApp::assemble(
        repos,
        Collaborators {
            gateways,
            cipher,
            clock,
            admin_validator,
            notifier: notifier.clone(),
            alerter: notifier,
        },
        &config.billing,
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = app.scheduler;
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
    tracing::info!("Billing scheduler started");

    let router = api_router(app.state, config.server.request_timeout());
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped; waiting for the scheduler");
    let _ = shutdown_tx.send(true);
    let grace = config.server.shutdown_grace();
    match tokio::time::timeout(grace, scheduler_task).await {
        Ok(joined) => joined?,
        Err(_) => tracing::warn!(grace_secs = grace.as_secs(), "scheduler did not stop within the grace period"),
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    match config.server.log_format() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
