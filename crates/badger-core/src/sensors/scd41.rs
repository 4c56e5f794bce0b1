use embedded_hal_async::i2c::I2c;
use log::{error, info};
use scd41_embedded::r#async::Scd41Async;

use super::{Co2Sensor, RawMeasurement, SensorError};

const SENSOR: &str = "SCD41";

/// SCD41 on an async I2C bus, driven in periodic-measurement mode.
pub struct Scd41Sensor<I> {
    sensor: Scd41Async<I, embassy_time::Delay>,
}

impl<I: I2c> Scd41Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Scd41Async::<I, embassy_time::Delay>::new(i2c, embassy_time::Delay),
        }
    }
}

impl<I: I2c> Co2Sensor for Scd41Sensor<I> {
    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sensor.start_periodic_measurement().await.map_err(|e| {
            error!("SCD41 start_periodic_measurement failed: {:?}", e);
            SensorError::CommandFailed {
                sensor: SENSOR,
                operation: "start periodic measurement",
            }
        })?;
        info!("SCD41: Periodic measurement started");
        Ok(())
    }

    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.sensor.data_ready().await.map_err(|e| {
            error!("SCD41 data_ready check failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "check data ready status",
            }
        })
    }

    async fn read_measurement(&mut self) -> Result<RawMeasurement, SensorError> {
        let measurement = self.sensor.measurement().await.map_err(|e| {
            error!("SCD41 measurement read failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "read measurement",
            }
        })?;

        Ok(RawMeasurement {
            co2_ppm: measurement.co2_ppm as u16,
            temperature_milli_celsius: (measurement.temperature_c as f32 * 1000.0) as i32,
            humidity_milli_percent: (measurement.humidity_rh as f32 * 1000.0) as i32,
        })
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.sensor.stop_periodic_measurement().await.map_err(|e| {
            error!("SCD41 stop_periodic_measurement failed: {:?}", e);
            SensorError::CommandFailed {
                sensor: SENSOR,
                operation: "stop periodic measurement",
            }
        })
    }
}
