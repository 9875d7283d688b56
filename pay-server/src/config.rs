//! Typed startup configuration (§6): every required environment variable is
//! read exactly once, here, and a missing or malformed one is a fatal
//! startup error (§6 "Exit codes").

use std::net::SocketAddr;

use anyhow::{bail, Context};
use pay_scheduler::FailurePolicy;

pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub callback_base_url: String,
    pub gateway_sandbox_base_url: String,
    pub gateway_production_base_url: String,
    pub secret_store_addr: String,
    pub bootstrap_signing_secret: String,
    pub subscription_failure_policy: FailurePolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let service_port: u16 = required("SERVICE_PORT")?
            .parse()
            .context("SERVICE_PORT must be a valid port number")?;
        let callback_base_url = required("CALLBACK_BASE_URL")?;
        let gateway_sandbox_base_url = required("GATEWAY_SANDBOX_BASE_URL")?;
        let gateway_production_base_url = required("GATEWAY_PRODUCTION_BASE_URL")?;
        let secret_store_addr = required("SECRET_STORE_ADDR")?;
        let bootstrap_signing_secret = required("BOOTSTRAP_SIGNING_SECRET")?;
        let subscription_failure_policy = match optional("SUBSCRIPTION_FAILURE_POLICY") {
            None => FailurePolicy::Forward,
            Some(raw) => parse_failure_policy(&raw)?,
        };

        Ok(Self {
            database_url,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], service_port)),
            callback_base_url,
            gateway_sandbox_base_url,
            gateway_production_base_url,
            secret_store_addr,
            bootstrap_signing_secret,
            subscription_failure_policy,
        })
    }
}

fn required(name: &'static str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("missing required env var {name}"))
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_failure_policy(raw: &str) -> anyhow::Result<FailurePolicy> {
    match raw {
        "forward" => Ok(FailurePolicy::Forward),
        "skip" => Ok(FailurePolicy::Skip),
        "pause" => Ok(FailurePolicy::Pause),
        other => bail!("SUBSCRIPTION_FAILURE_POLICY must be one of forward/skip/pause, got {other}"),
    }
}
