//! Periodic background work (§4.8, §4.9, §4.6, §5): public-key refresh,
//! credential-registry refresh, rate-limit bucket reaping, the ACH
//! promotion sweep, and the subscription billing tick. Every task is an
//! [`LxTask`], folded into the static-task list `main` joins on shutdown.

use std::time::Duration;

use pay_auth::public_key_store::DEFAULT_REFRESH_INTERVAL as KEY_REFRESH_INTERVAL;
use pay_scheduler::SubscriptionScheduler;
use pay_tokio::task::LxTask;

use crate::state::AppState;

const CREDENTIAL_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const RATE_LIMIT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RATE_LIMIT_MAX_AGE_MINUTES: i64 = 5;
const ACH_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const SUBSCRIPTION_TICK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const SUBSCRIPTION_BATCH_SIZE: i64 = 500;

/// Spawn every periodic task, returning them as a flat list the caller
/// joins alongside the HTTP server and worker pool.
pub fn spawn_all(state: AppState, failure_policy: pay_scheduler::FailurePolicy) -> Vec<LxTask<()>> {
    let mut tasks = Vec::new();

    tasks.push(state.public_keys.clone().spawn_refresh_task(KEY_REFRESH_INTERVAL));
    tasks.push(
        state
            .rate_limiter
            .clone()
            .spawn_reap_task(RATE_LIMIT_REAP_INTERVAL, RATE_LIMIT_MAX_AGE_MINUTES),
    );
    tasks.push(spawn_credential_refresh(state.clone()));
    tasks.push(spawn_ach_sweep(state.clone()));
    tasks.push(spawn_subscription_tick(state, failure_policy));

    tasks
}

fn spawn_credential_refresh(state: AppState) -> LxTask<()> {
    LxTask::spawn("credential-registry-refresh", async move {
        let mut ticker = tokio::time::interval(CREDENTIAL_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = state.registry.refresh().await {
                tracing::warn!(error = %e, "credential registry refresh failed");
            }
        }
    })
}

fn spawn_ach_sweep(state: AppState) -> LxTask<()> {
    LxTask::spawn("ach-promotion-sweep", async move {
        let mut ticker = tokio::time::interval(ACH_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match state.ach_verifier.run_promotion_sweep(chrono::Utc::now()).await {
                Ok(promoted) => {
                    if promoted > 0 {
                        tracing::info!(promoted, "ACH prenotes promoted");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ACH promotion sweep failed"),
            }
        }
    })
}

fn spawn_subscription_tick(state: AppState, failure_policy: pay_scheduler::FailurePolicy) -> LxTask<()> {
    let scheduler = SubscriptionScheduler::new(state.subscriptions.clone(), state.engine.clone(), failure_policy);
    LxTask::spawn("subscription-billing-tick", async move {
        let mut ticker = tokio::time::interval(SUBSCRIPTION_TICK_INTERVAL);
        loop {
            ticker.tick().await;
            let as_of = chrono::Utc::now().date_naive();
            match scheduler.process_due_billing(as_of, SUBSCRIPTION_BATCH_SIZE).await {
                Ok(outcome) => tracing::info!(
                    processed = outcome.processed,
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    "subscription billing tick complete"
                ),
                Err(e) => tracing::warn!(error = %e, "subscription billing tick failed"),
            }
        }
    })
}
