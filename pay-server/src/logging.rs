//! Global logger setup (§6 `RUST_LOG`), mirroring the teacher's `logger`
//! crate: `RUST_LOG` drives a `tracing_subscriber::EnvFilter`, defaulting to
//! `info` when unset or unparseable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(filter)
        .try_init()
        .expect("logger already initialized");
}
