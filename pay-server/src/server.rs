//! The HTTP listener and its middleware stack (§4.11, §5). Generalizes the
//! teacher's `lexe_api::server::{LayerConfig, build_server_fut_with_listener}`
//! to a plain TLS-terminated-elsewhere HTTP server: the SGX remote
//! attestation and `axum-server`/`tls-rustls` machinery that module carries
//! has no place in a payment core's HTTP veneer, so this crate depends on
//! `axum`/`tower`/`tower-http` directly instead of on `lexe-api`.

use std::{net::SocketAddr, time::Duration};

use axum::{error_handling::HandleErrorLayer, extract::DefaultBodyLimit, http::StatusCode, Router};
use pay_common::PayError;
use pay_tokio::{notify_once::NotifyOnce, task::LxTask};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Mirrors `LayerConfig`'s defaults (§5: body limit, load shedding, bounded
/// buffering/concurrency, and a per-request handling timeout).
#[derive(Clone, Copy, Debug)]
pub struct LayerConfig {
    pub body_limit: Option<usize>,
    pub load_shed: bool,
    pub buffer_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub handling_timeout: Option<Duration>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            body_limit: Some(16 * 1024),
            load_shed: true,
            buffer_size: Some(4096),
            concurrency: Some(4096),
            handling_timeout: Some(Duration::from_secs(15)),
        }
    }
}

async fn handle_load_shed_error(err: tower::BoxError) -> (StatusCode, String) {
    if err.is::<tower::load_shed::error::Overloaded>() {
        (StatusCode::SERVICE_UNAVAILABLE, "server overloaded, try again later".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled middleware error: {err}"))
    }
}

async fn handle_timeout_error(err: tower::BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::GATEWAY_TIMEOUT, "request handling timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("unhandled middleware error: {err}"))
    }
}

fn with_layers(router: Router, config: LayerConfig) -> Router {
    let inner = ServiceBuilder::new()
        .layer(DefaultBodyLimit::max(config.body_limit.unwrap_or(usize::MAX)))
        .layer(HandleErrorLayer::new(handle_load_shed_error))
        .option_layer(config.load_shed.then(tower::load_shed::LoadShedLayer::new))
        .option_layer(config.buffer_size.map(tower::buffer::BufferLayer::new))
        .option_layer(config.concurrency.map(tower::limit::ConcurrencyLimitLayer::new))
        .layer(HandleErrorLayer::new(handle_timeout_error))
        .option_layer(config.handling_timeout.map(tower::timeout::TimeoutLayer::new));

    let outer = ServiceBuilder::new().layer(TraceLayer::new_for_http());

    router.layer(inner).layer(outer)
}

/// Bind `listen_addr` and spawn the server as a joinable [`LxTask`]. The
/// returned task resolves once `shutdown` fires and in-flight requests have
/// drained (axum's own graceful-shutdown grace period).
pub async fn spawn_server_task(
    listen_addr: SocketAddr,
    router: Router,
    config: LayerConfig,
    mut shutdown: NotifyOnce,
) -> Result<LxTask<()>, PayError> {
    let router = with_layers(router, config);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| PayError::internal(format!("bind {listen_addr}: {e}")))?;
    tracing::info!(%listen_addr, "pay-server listening");

    let task = LxTask::spawn("http-server", async move {
        let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, make_service)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "http server exited with error");
        }
    });
    Ok(task)
}
