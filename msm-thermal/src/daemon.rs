//! Daemon wiring: sysfs hardware, the controller task and the API server.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::api::{self, SharedState};
use crate::config::DaemonConfig;
use crate::error::{Error, Result};
use crate::hw::{CpuFreq, PowerControl, TemperatureSensor};
use crate::sysfs::{DryRunPowerOff, SysfsCpuFreq, SysfsThermalZone, SystemPowerOff};
use crate::thermal::{SharedConfig, ThermalController};
use crate::tracing::prelude::*;

/// Run until SIGINT/SIGTERM or until the controller stops after a critical
/// shutdown.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let thermal = SharedConfig::new(config.thermal.clone())?;
    if config.thermal.shutdown_temp <= config.thermal.max.high {
        warn!(
            shutdown_temp = config.thermal.shutdown_temp,
            allowed_max_high = config.thermal.max.high,
            "Shutdown temperature is not above the max band; phase 3 is unreachable"
        );
    }

    let mut sensor = SysfsThermalZone::new(
        &config.thermal_root,
        config.thermal.sensor_id,
        config.sensor_unit,
    );
    match sensor.read_temperature().await {
        Ok(temp) => info!(path = %sensor.path().display(), temp, "Temperature sensor ready"),
        Err(e) => warn!(
            path = %sensor.path().display(),
            error = %e,
            "Temperature sensor not readable yet"
        ),
    }

    let cpufreq = SysfsCpuFreq::discover(&config.cpu_root).await?;
    info!(cpus = ?cpufreq.possible_cpus(), "cpufreq ready");

    let power: Arc<dyn PowerControl> = if config.dry_run {
        warn!("Dry run: critical shutdown will only be logged");
        Arc::new(DryRunPowerOff)
    } else {
        Arc::new(SystemPowerOff)
    };

    let controller = ThermalController::new(
        thermal.clone(),
        Box::new(sensor),
        Box::new(cpufreq),
        power,
    );
    let state = SharedState {
        config: thermal,
        status_rx: controller.subscribe(),
    };

    let shutdown = CancellationToken::new();
    let mut controller_task = tokio::spawn(controller.run(shutdown.clone()));
    let api_task = tokio::spawn(api::serve(config.api_addr, state, shutdown.clone()));

    let mut sigterm = signal(SignalKind::terminate())?;
    let controller_finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
            false
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
            false
        }
        result = &mut controller_task => {
            if let Err(e) = result {
                error!(error = %e, "Thermal controller task failed");
            }
            true
        }
    };

    shutdown.cancel();

    if !controller_finished {
        if let Err(e) = controller_task.await {
            error!(error = %e, "Thermal controller task failed");
        }
    }

    match api_task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Other(format!("{e:#}"))),
        Err(e) => Err(Error::Other(format!("API server task failed: {e}"))),
    }
}
