//! Fixed-capacity reading history persisted with the badge state.

use core::fmt::Display;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::HISTORY_CAPACITY;
use crate::sensors::RawMeasurement;

/// One sample of CO2, temperature and humidity.
///
/// The all-zero value is the "no sample" sentinel, and so is any reading whose
/// CO2 is zero: the sensor never reports 0 ppm for a valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    /// CO2 concentration in ppm
    pub co2: f32,
    /// Temperature in °C
    pub temperature: f32,
    /// Relative humidity in %
    pub humidity: f32,
}

impl Reading {
    pub const fn new(co2: f32, temperature: f32, humidity: f32) -> Self {
        Self {
            co2,
            temperature,
            humidity,
        }
    }

    /// Convert the sensor's fixed-point milli-units.
    pub fn from_raw(raw: RawMeasurement) -> Self {
        Self {
            co2: raw.co2_ppm as f32,
            temperature: raw.temperature_milli_celsius as f32 / 1000.0,
            humidity: raw.humidity_milli_percent as f32 / 1000.0,
        }
    }

    /// True for unused slots and invalid samples.
    pub fn is_sentinel(&self) -> bool {
        self.co2 == 0.0
    }

    pub fn temperature_fahrenheit(&self) -> f32 {
        self.temperature * 9.0 / 5.0 + 32.0
    }

    /// Value of one metric
    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Co2 => self.co2,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
        }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Reading] co2: {:.0} ppm, temperature: {:.1}°C, humidity: {:.1}%",
            self.co2, self.temperature, self.humidity
        )
    }
}

/// The quantities a reading carries, one chart each on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Co2,
    Temperature,
    Humidity,
}

impl Metric {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Co2 => "CO2",
            Self::Temperature => "TEMP",
            Self::Humidity => "RH",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Co2 => "ppm",
            Self::Temperature => "°C",
            Self::Humidity => "%",
        }
    }
}

/// Range of a metric over the valid samples of a history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesBounds {
    pub min: f32,
    pub max: f32,
}

impl SeriesBounds {
    /// A flat series has nothing to scale a chart against.
    pub fn is_flat(&self) -> bool {
        self.min == self.max
    }
}

/// Ring buffer of the last [`HISTORY_CAPACITY`] readings.
///
/// `index` points at the most recently written slot, not past it. A fresh
/// history is all sentinels with `index == 0`, so the first recorded reading
/// lands in slot 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingHistory {
    readings: [Reading; HISTORY_CAPACITY],
    index: u8,
}

impl Default for ReadingHistory {
    fn default() -> Self {
        Self {
            readings: [Reading::default(); HISTORY_CAPACITY],
            index: 0,
        }
    }
}

impl ReadingHistory {
    pub const CAPACITY: usize = HISTORY_CAPACITY;

    /// Overwrite the oldest slot with `reading` and make it the latest.
    pub fn record(&mut self, reading: Reading) {
        let next = (self.index as usize + 1) % HISTORY_CAPACITY;
        self.readings[next] = reading;
        self.index = next as u8;
    }

    /// The most recently recorded reading (a sentinel if none was ever recorded).
    pub fn latest(&self) -> Reading {
        self.readings[self.index as usize]
    }

    /// Index of the most recently written slot.
    pub fn reading_index(&self) -> u8 {
        self.index
    }

    /// All slots, oldest first, ending with [`latest`](Self::latest).
    ///
    /// Slots that were never written come back as sentinels; charting code
    /// must skip them (see [`Reading::is_sentinel`]) rather than plot zeros.
    pub fn chronological(&self) -> [Reading; HISTORY_CAPACITY] {
        let mut view = self.readings;
        view.rotate_left((self.index as usize + 1) % HISTORY_CAPACITY);
        view
    }

    /// The chronological view with sentinels removed.
    pub fn valid_chronological(&self) -> Vec<Reading, HISTORY_CAPACITY> {
        self.chronological()
            .into_iter()
            .filter(|r| !r.is_sentinel())
            .collect()
    }

    /// One metric over the chronological view. Sentinel slots yield `0.0`.
    pub fn series(&self, metric: Metric) -> [f32; HISTORY_CAPACITY] {
        self.chronological().map(|r| if r.is_sentinel() { 0.0 } else { r.get(metric) })
    }

    /// Min and max of `metric` over valid samples, `None` when there are none.
    pub fn bounds(&self, metric: Metric) -> Option<SeriesBounds> {
        self.readings
            .iter()
            .filter(|r| !r.is_sentinel())
            .map(|r| r.get(metric))
            .fold(None, |acc, v| match acc {
                None => Some(SeriesBounds { min: v, max: v }),
                Some(b) => Some(SeriesBounds {
                    min: b.min.min(v),
                    max: b.max.max(v),
                }),
            })
    }

    /// Structural check for a history decoded from storage.
    pub(crate) fn is_consistent(&self) -> bool {
        (self.index as usize) < HISTORY_CAPACITY
    }
}
