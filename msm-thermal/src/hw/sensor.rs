use async_trait::async_trait;

use super::Celsius;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("failed to read sensor {sensor}: {source}")]
    Io {
        sensor: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("sensor {sensor} returned unparseable value {raw:?}")]
    Parse { sensor: u32, raw: String },

    #[error("sensor {0} is not available")]
    Unavailable(u32),
}

/// A temperature sensor, e.g. one TSENS channel.
#[async_trait]
pub trait TemperatureSensor: Send {
    /// Sensor number this instance reads.
    fn id(&self) -> u32;

    /// Take one reading.
    ///
    /// Errors are treated as transient by the controller; the call is simply
    /// retried on the next tick.
    async fn read_temperature(&mut self) -> Result<Celsius, SensorError>;
}
