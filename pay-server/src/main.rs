//! Entry point (§6): load config, connect and migrate the database, wire
//! every module into an [`AppState`], spawn the HTTP server and background
//! tasks, and run until shutdown, mirroring `sdk-sidecar`'s
//! `main.rs`/`run.rs` split.

mod auth;
mod background;
mod cli;
mod config;
mod logging;
mod routes;
mod server;
mod state;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use pay_auth::{JwtVerifier, PublicKeyStore, RateLimiter};
use pay_engine::{ach_verifier::AchVerifier, transaction_engine::TransactionEngine, browser_post::BrowserPostCoordinator};
use pay_gateway::{credential_registry::CredentialRegistry, gateway_adapter::GatewayAdapter};
use pay_secrets::{HttpSecretBackend, SecretResolver};
use pay_store::{
    payment_method_store::PaymentMethodStore, subscription_store::SubscriptionStore,
    transaction_store::TransactionStore, AuditLogStore, IpWhitelistStore, SqlxJtiBlacklist,
    SqlxMerchantStore, SqlxRateLimitBackend, SqlxServiceRegistry,
};
use pay_tokio::{notify_once::NotifyOnce, task, worker_pool::WorkerPool};

use crate::{cli::PayServerArgs, state::AppState};

const SHUTDOWN_TIME_LIMIT: Duration = Duration::from_secs(10);
const WORKER_POOL_WORKERS: usize = 4;
const WORKER_POOL_QUEUE_CAPACITY: usize = 1024;
const SECRET_CACHE_CAPACITY: usize = 1_000;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init();

    let config = PayServerArgs::load_config()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let pool = pay_store::pool::connect(&config.database_url).await?;
    pay_store::pool::migrate(&pool).await?;

    let secrets_backend = HttpSecretBackend::new(&config.secret_store_addr, &config.bootstrap_signing_secret)?;
    let secrets = Arc::new(SecretResolver::with_default_ttl(secrets_backend, SECRET_CACHE_CAPACITY));

    let merchant_store = SqlxMerchantStore::new(pool.clone());
    let registry = Arc::new(CredentialRegistry::new(merchant_store, secrets.clone()));
    registry.refresh().await.context("initial credential registry refresh")?;

    let gateway = Arc::new(GatewayAdapter::new(
        config.gateway_sandbox_base_url.clone(),
        config.gateway_production_base_url.clone(),
    ));

    let transactions = Arc::new(TransactionStore::new(pool.clone()));
    let payment_methods = Arc::new(PaymentMethodStore::new(pool.clone()));
    let subscriptions = Arc::new(SubscriptionStore::new(pool.clone()));
    let ip_whitelist = Arc::new(IpWhitelistStore::new(pool.clone()));
    let audit_log = Arc::new(AuditLogStore::new(pool.clone()));

    let engine = Arc::new(TransactionEngine::new(
        transactions.clone(),
        gateway.clone(),
        registry.clone(),
        secrets.clone(),
    ));
    let browser_post = Arc::new(BrowserPostCoordinator::new(
        transactions.clone(),
        gateway.clone(),
        registry.clone(),
        secrets.clone(),
    ));
    let ach_verifier = Arc::new(AchVerifier::new(payment_methods.clone()));

    let service_registry = Arc::new(SqlxServiceRegistry::new(pool.clone()));
    let jti_blacklist = Arc::new(SqlxJtiBlacklist::new(pool.clone()));
    let rate_limit_backend = SqlxRateLimitBackend::new(pool.clone());

    let public_keys = Arc::new(PublicKeyStore::new(service_registry));
    public_keys.refresh().await.context("initial public key store refresh")?;
    let jwt = Arc::new(JwtVerifier::new(public_keys.clone(), jti_blacklist));
    let rate_limiter = Arc::new(RateLimiter::new(rate_limit_backend));

    let (worker_pool, worker_tasks) =
        WorkerPool::spawn("pay-server-workers", WORKER_POOL_WORKERS, WORKER_POOL_QUEUE_CAPACITY);
    let worker_pool = Arc::new(worker_pool);

    let app_state = AppState {
        engine,
        browser_post,
        registry,
        gateway,
        transactions,
        payment_methods,
        subscriptions,
        ach_verifier,
        ip_whitelist,
        audit_log,
        worker_pool,
        jwt,
        public_keys,
        rate_limiter,
        secrets,
        callback_base_url: Arc::from(config.callback_base_url.as_str()),
    };

    let shutdown = NotifyOnce::new();
    let router = routes::router(app_state.clone()).with_state(app_state.clone());

    let mut static_tasks = Vec::new();
    static_tasks.push(
        server::spawn_server_task(config.listen_addr, router, server::LayerConfig::default(), shutdown.clone())
            .await
            .context("failed to spawn http server task")?,
    );
    static_tasks.extend(worker_tasks);
    static_tasks.extend(background::spawn_all(app_state, config.subscription_failure_policy));

    task::LxTask::spawn("ctrlc-handler", {
        let shutdown = shutdown.clone();
        async move {
            use tokio::signal::ctrl_c;
            tracing::info!("ready; press Ctrl+C to shut down");
            ctrl_c().await.expect("failed to listen for ctrl-c");
            tracing::info!("shutdown signal received, draining in-flight work");
            shutdown.send();
            ctrl_c().await.expect("failed to listen for second ctrl-c");
            std::process::exit(1);
        }
    })
    .detach();

    let (_eph_tasks_tx, eph_tasks_rx) = tokio::sync::mpsc::channel(1);
    task::try_join_tasks_and_shutdown(static_tasks, eph_tasks_rx, shutdown, SHUTDOWN_TIME_LIMIT)
        .await
        .context("error awaiting tasks")?;

    Ok(())
}
