//! Command-line entry point (§6 environment variables), in the teacher's
//! `argh`-plus-env-fallback style (`sdk-sidecar::cli`): every setting has an
//! env var; the CLI flag is there only to override it locally without
//! exporting a variable.

use std::net::SocketAddr;

use crate::config::Config;

/// pay-server: the payment core's HTTP veneer (§4.11).
#[derive(argh::FromArgs)]
pub struct PayServerArgs {
    /// override `SERVICE_PORT`; the listener binds `0.0.0.0:<port>`.
    #[argh(option)]
    pub port: Option<u16>,
}

impl PayServerArgs {
    pub fn load_config() -> anyhow::Result<Config> {
        let args: Self = argh::from_env();
        let mut config = Config::from_env()?;
        if let Some(port) = args.port {
            config.listen_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }
        Ok(config)
    }
}
