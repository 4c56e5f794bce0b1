//! The measurement loop that runs in the worker context.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use super::AcquisitionShared;
use crate::config::POLL_INTERVAL;
use crate::sensors::{Co2Sensor, SensorError};
use crate::storage::Reading;

/// Clears the in-flight flag when dropped, whichever way the attempt ends.
struct InFlight<'a>(&'a AcquisitionShared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.mark_idle();
    }
}

/// Takes one reading per launch from a [`Co2Sensor`] and hands it to the main
/// context through the shared queue.
pub struct AcquisitionWorker<S, D> {
    sensor: S,
    delay: D,
}

impl<S: Co2Sensor, D: DelayNs> AcquisitionWorker<S, D> {
    pub fn new(sensor: S, delay: D) -> Self {
        Self { sensor, delay }
    }

    pub fn release(self) -> (S, D) {
        (self.sensor, self.delay)
    }

    /// Serve launch requests forever, one fresh attempt per request.
    pub async fn run(mut self, shared: &AcquisitionShared) -> ! {
        info!("Acquisition worker ready");
        loop {
            shared.wait_for_launch().await;
            self.run_attempt(shared).await;
        }
    }

    /// Take one measurement and publish it.
    ///
    /// Returns the published reading, or `None` if the sensor failed or the
    /// queue stayed full. The in-flight flag is cleared last, after the reading
    /// is in the queue.
    pub async fn run_attempt(&mut self, shared: &AcquisitionShared) -> Option<Reading> {
        let _in_flight = InFlight(shared);
        debug!("Acquisition attempt started");

        let reading = match self.measure().await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Acquisition aborted: {}", e);
                return None;
            }
        };
        info!("{}", reading);

        match shared
            .queue()
            .publish_with_backoff(reading, &mut self.delay)
            .await
        {
            Ok(()) => Some(reading),
            Err(e) => {
                warn!("Dropping reading: {}", e);
                None
            }
        }
    }

    /// Run the sensor until it yields a valid sample.
    ///
    /// Only a failed data-ready query ends the attempt; read failures and
    /// invalid samples go back to polling.
    async fn measure(&mut self) -> Result<Reading, SensorError> {
        if let Err(e) = self.sensor.start_periodic_measurement().await {
            // Already measuring after an interrupted attempt
            warn!("Start measurement failed, continuing: {}", e);
        }

        let raw = loop {
            self.delay.delay_ms(POLL_INTERVAL.as_millis() as u32).await;

            if !self.sensor.data_ready().await? {
                debug!("Sensor data not ready");
                continue;
            }

            match self.sensor.read_measurement().await {
                Ok(m) if m.co2_ppm == 0 => warn!("Discarding sample with zero CO2"),
                Ok(m) => break m,
                Err(e) => warn!("Read measurement failed, polling again: {}", e),
            }
        };

        if let Err(e) = self.sensor.stop_periodic_measurement().await {
            warn!("Stop measurement failed: {}", e);
        }

        Ok(Reading::from_raw(raw))
    }
}
