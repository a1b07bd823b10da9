//! Thermal throttling daemon.
//!
//! Configuration comes from the environment, see [`msm_thermal::config`].

use anyhow::Result;

use msm_thermal::{config::DaemonConfig, daemon, tracing};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = DaemonConfig::load()?;
    daemon::run(config).await?;

    Ok(())
}
