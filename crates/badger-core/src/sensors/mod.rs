//! Sensor abstraction the acquisition worker runs against

#[cfg(feature = "sensor-scd41")]
pub mod scd41;

#[cfg(feature = "sensor-scd41")]
pub use scd41::Scd41Sensor;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: command failed: {operation}")]
    CommandFailed {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: read failed: {operation}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// One measurement as the sensor reports it, in fixed-point units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMeasurement {
    /// CO2 concentration in ppm. `0` marks an invalid sample.
    pub co2_ppm: u16,
    /// Temperature in milli-degrees Celsius
    pub temperature_milli_celsius: i32,
    /// Relative humidity in milli-percent
    pub humidity_milli_percent: i32,
}

/// A CO2 sensor driven in periodic-measurement mode.
///
/// The worker only needs these four commands; bus framing and command delays
/// belong to the driver behind the implementation.
pub trait Co2Sensor {
    /// Begin periodic measurement. Fails harmlessly if the sensor is already measuring.
    fn start_periodic_measurement(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Whether a new measurement can be read.
    fn data_ready(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Fetch the most recent measurement.
    fn read_measurement(&mut self) -> impl Future<Output = Result<RawMeasurement, SensorError>>;

    /// Return the sensor to idle.
    fn stop_periodic_measurement(&mut self) -> impl Future<Output = Result<(), SensorError>>;
}
