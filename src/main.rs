use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use storefront_checkout::api::{self, ApiState};
use storefront_checkout::config::AppConfig;
use storefront_checkout::database::memory::{InMemoryOrderRepository, InMemoryUserRepository};
use storefront_checkout::database::order_repository::OrderRepository;
use storefront_checkout::database::user_repository::UserRepository;
use storefront_checkout::health::HealthChecker;
use storefront_checkout::logging::init_tracing;
use storefront_checkout::payments::providers::RazorpayGateway;
use storefront_checkout::payments::PaymentGateway;
use storefront_checkout::services::{
    CheckoutService, FulfillmentEngine, HttpMailer, LogMailer, Mailer, VendorService,
};
use storefront_checkout::shipping::providers::ShiprocketClient;
use storefront_checkout::shipping::{MemoryTokenStore, ShippingAggregator, ShippingSession, TokenStore};
use storefront_checkout::workers::{FulfillmentRetryConfig, FulfillmentRetryWorker};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

struct Repositories {
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    #[cfg(feature = "database")]
    pool: Option<sqlx::PgPool>,
}

#[cfg(feature = "database")]
async fn build_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    use storefront_checkout::database::order_repository::PgOrderRepository;
    use storefront_checkout::database::user_repository::PgUserRepository;
    use storefront_checkout::database::{init_pool, run_migrations, PoolConfig};

    if config.skip_externals {
        info!("Skipping database initialization (SKIP_EXTERNALS=true), using in-memory stores");
        return Ok(Repositories {
            orders: Arc::new(InMemoryOrderRepository::new()),
            users: Arc::new(InMemoryUserRepository::new()),
            pool: None,
        });
    }

    let pool = init_pool(&config.database.url, Some(PoolConfig::from(&config.database))).await?;
    run_migrations(&pool).await?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    Ok(Repositories {
        orders: Arc::new(PgOrderRepository::new(pool.clone())),
        users: Arc::new(PgUserRepository::new(pool.clone())),
        pool: Some(pool),
    })
}

#[cfg(not(feature = "database"))]
async fn build_repositories(_config: &AppConfig) -> anyhow::Result<Repositories> {
    info!("Built without the database feature, using in-memory stores");
    Ok(Repositories {
        orders: Arc::new(InMemoryOrderRepository::new()),
        users: Arc::new(InMemoryUserRepository::new()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        skip_externals = config.skip_externals,
        "Starting storefront checkout service"
    );

    let repos = build_repositories(&config).await?;

    #[cfg(feature = "cache")]
    let cache_pool = if config.skip_externals {
        info!("Skipping Redis initialization (SKIP_EXTERNALS=true)");
        None
    } else {
        let pool = storefront_checkout::cache::init_cache_pool((&config.cache).into()).await?;
        info!("Cache connection pool initialized");
        Some(pool)
    };

    // Shipping session: shared through Redis when available so every
    // instance reuses one login
    #[cfg(feature = "cache")]
    let (token_store, session_key): (Arc<dyn TokenStore>, String) = match &cache_pool {
        Some(pool) => (
            Arc::new(storefront_checkout::shipping::session::RedisTokenStore::new(pool.clone()))
                as Arc<dyn TokenStore>,
            storefront_checkout::cache::keys::shipping::SessionTokenKey::new(&config.shipping.email)
                .to_string(),
        ),
        None => (
            Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
            config.shipping.email.to_lowercase(),
        ),
    };
    #[cfg(not(feature = "cache"))]
    let (token_store, session_key): (Arc<dyn TokenStore>, String) = (
        Arc::new(MemoryTokenStore::new()),
        config.shipping.email.to_lowercase(),
    );

    let session = ShippingSession::new(
        token_store,
        session_key,
        Duration::from_secs(config.shipping.token_ttl_secs),
    );
    let shipping: Arc<dyn ShippingAggregator> =
        Arc::new(ShiprocketClient::new(config.shipping.shiprocket(), session)?);
    info!(
        provider = shipping.name(),
        quote_selection = config.shipping.quote_selection.as_str(),
        "Shipping aggregator client initialized"
    );

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(RazorpayGateway::new(config.payment.razorpay())?);
    info!(provider = gateway.name(), currency = %config.payment.currency, "Payment gateway initialized");

    let mailer: Arc<dyn Mailer> = match &config.mail.service_url {
        Some(url) => Arc::new(HttpMailer::new(
            url.clone(),
            Duration::from_secs(config.mail.timeout_secs),
        )?),
        None => {
            warn!("MAIL_SERVICE_URL not set, confirmation emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let fulfillment = Arc::new(FulfillmentEngine::new(
        repos.orders.clone(),
        shipping.clone(),
        mailer,
        config.shipping.package,
        config.checkout.lease_secs,
    ));
    let vendors = Arc::new(VendorService::new(repos.users.clone(), repos.orders.clone()));
    let checkout = Arc::new(CheckoutService::new(
        repos.orders.clone(),
        vendors.clone(),
        gateway,
        fulfillment.clone(),
        config.checkout.clone(),
    ));

    #[allow(unused_mut)]
    let mut health = HealthChecker::new(shipping.clone());
    #[cfg(feature = "database")]
    if let Some(pool) = repos.pool.clone() {
        health = health.with_database(pool);
    }
    #[cfg(feature = "cache")]
    if let Some(pool) = cache_pool.clone() {
        health = health.with_cache(pool);
    }

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let worker = FulfillmentRetryWorker::new(
        repos.orders.clone(),
        fulfillment,
        FulfillmentRetryConfig {
            interval: Duration::from_secs(config.checkout.retry_interval_secs),
            batch_size: config.checkout.retry_batch_size,
            max_attempts: config.checkout.max_fulfillment_attempts,
        },
    );
    let worker_handle = tokio::spawn(worker.run(worker_shutdown_rx));

    let app = api::router(ApiState {
        checkout,
        vendors,
        shipping,
        health,
        auth: config.auth.clone(),
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .is_err()
    {
        error!("Timed out waiting for fulfillment retry worker shutdown");
    }

    info!("Server shutdown complete");
    Ok(())
}
