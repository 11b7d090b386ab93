//! Summarizz billing service.
//!
//! Serves the subscription API and billing webhook, and runs the expiry
//! sweep, pending-subscription link-back and failed-transition retry jobs.
//!
//! ## Endpoints
//!
//! - `POST /webhook` - Stripe webhook
//! - `POST /subscription/create-checkout-session`
//! - `POST /subscription/cancel`
//! - `GET /subscription/status`
//! - `GET /health` - Liveness probe

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use summarizz_billing::adapters::http::{
    app_router, AuthState, HttpSettings, SubscriptionAppState, SubscriptionSettings,
};
use summarizz_billing::adapters::{
    InMemoryPendingSubscriptionRepository, InMemoryReconcileOutbox,
    InMemoryUserSubscriptionRepository, JobRunner, JwtSessionValidator,
    PostgresPendingSubscriptionRepository, PostgresReconcileOutbox,
    PostgresUserSubscriptionRepository, StripeBillingGateway, StripeConfig, SystemClock,
};
use summarizz_billing::application::{
    CheckoutSettings, LinkPendingSubscriptionsHandler, RetryFailedTransitionsHandler,
    RetrySettings, SweepExpiredSubscriptionsHandler,
};
use summarizz_billing::config::{AppConfig, DatabaseConfig, PaymentConfig, ServerConfig};
use summarizz_billing::ports::{
    BillingGateway, Clock, PendingSubscriptionRepository, ReconcileOutbox, RetryPolicy,
    ScheduledJob, UserSubscriptionRepository,
};

/// The three record stores, Postgres-backed or in-memory.
struct Stores {
    users: Arc<dyn UserSubscriptionRepository>,
    pending: Arc<dyn PendingSubscriptionRepository>,
    outbox: Arc<dyn ReconcileOutbox>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.test_mode,
        "Starting Summarizz billing service"
    );

    let stores = connect_stores(&config.database).await?;
    let gateway: Arc<dyn BillingGateway> =
        Arc::new(StripeBillingGateway::new(stripe_config(&config.payment)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let reconciler = &config.reconciler;
    let retry_policy = RetryPolicy::new(reconciler.retry_base_delay_secs, reconciler.max_retry_attempts);

    let state = SubscriptionAppState {
        users: stores.users.clone(),
        pending: stores.pending.clone(),
        outbox: stores.outbox.clone(),
        gateway,
        clock: clock.clone(),
        settings: SubscriptionSettings {
            checkout: CheckoutSettings::new(
                config.payment.stripe_price_id.clone(),
                config.payment.frontend_url.clone(),
            ),
            retry_policy,
            test_mode: config.payment.test_mode,
            synthesize_missing_period_end: reconciler.synthesize_missing_period_end,
        },
    };

    // Background jobs
    let jobs: Vec<Arc<dyn ScheduledJob>> = vec![
        Arc::new(SweepExpiredSubscriptionsHandler::new(
            stores.users.clone(),
            clock.clone(),
            reconciler.sweep_interval(),
        )),
        Arc::new(LinkPendingSubscriptionsHandler::new(
            stores.users.clone(),
            stores.pending.clone(),
            clock.clone(),
            reconciler.link_batch_size,
            reconciler.link_interval(),
        )),
        Arc::new(RetryFailedTransitionsHandler::new(
            stores.outbox.clone(),
            Arc::new(state.reconciler()),
            clock.clone(),
            RetrySettings {
                policy: retry_policy,
                batch_size: reconciler.retry_batch_size,
                retention_hours: reconciler.outbox_retention_hours,
                interval: reconciler.retry_interval(),
            },
        )),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runners: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let shutdown = shutdown_rx.clone();
            let runner = JobRunner::new(job);
            tokio::spawn(async move { runner.run(shutdown).await })
        })
        .collect();

    // HTTP
    let validator = JwtSessionValidator::new(config.auth.jwt_secret.clone())
        .with_leeway(config.auth.leeway_secs);
    let auth = AuthState::new(Arc::new(validator)).with_cookie_name(config.auth.cookie_name.clone());
    let http = HttpSettings {
        request_timeout: config.server.request_timeout(),
        cors_origins: config.server.cors_origins_list(),
    };
    let app = app_router(state, auth, &http);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let each job finish its current tick
    let _ = shutdown_tx.send(true);
    for runner in runners {
        if let Err(e) = runner.await {
            tracing::error!(error = %e, "Scheduled job task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_new(&server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if server.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init();
    }
}

fn stripe_config(payment: &PaymentConfig) -> StripeConfig {
    let config = StripeConfig::new(
        payment.stripe_api_key.clone(),
        payment.stripe_webhook_secret.clone(),
    )
    .with_require_livemode(payment.require_livemode);

    match &payment.api_base_url {
        Some(url) => config.with_base_url(url.clone()),
        None => config,
    }
}

async fn connect_stores(database: &DatabaseConfig) -> anyhow::Result<Stores> {
    if !database.is_configured() {
        tracing::warn!("No database configured, using in-memory stores");
        return Ok(Stores {
            users: Arc::new(InMemoryUserSubscriptionRepository::new()),
            pending: Arc::new(InMemoryPendingSubscriptionRepository::new()),
            outbox: Arc::new(InMemoryReconcileOutbox::new()),
        });
    }

    let pool = PgPoolOptions::new()
        .min_connections(database.min_connections)
        .max_connections(database.max_connections)
        .acquire_timeout(database.acquire_timeout())
        .idle_timeout(Some(database.idle_timeout()))
        .max_lifetime(Some(database.max_lifetime()))
        .connect(&database.url)
        .await?;
    tracing::info!("Database pool created");

    if database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    Ok(Stores {
        users: Arc::new(PostgresUserSubscriptionRepository::new(pool.clone())),
        pending: Arc::new(PostgresPendingSubscriptionRepository::new(pool.clone())),
        outbox: Arc::new(PostgresReconcileOutbox::new(pool)),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
