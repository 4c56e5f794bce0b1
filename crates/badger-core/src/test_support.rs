//! Host-side doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::sensors::{Co2Sensor, RawMeasurement, SensorError};

pub use embassy_futures::block_on;

/// Delay that returns immediately and remembers what it was asked for.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ms: u64,
    pub calls_ms: Vec<u32>,
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ms += u64::from(ns) / 1_000_000;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.total_ms += u64::from(ms);
        self.calls_ms.push(ms);
    }
}

/// RAM-backed NOR flash with RP2040-like geometry.
///
/// Erase sets bytes to `0xFF`; program can only clear bits.
pub struct MemFlash {
    pub data: Vec<u8>,
    pub erases: Vec<(u32, u32)>,
    pub writes: Vec<(u32, usize)>,
    pub fail_writes: bool,
    /// Record, on every erase, whether another thread is locked out of the
    /// critical section.
    pub watch_critical_section: bool,
    pub erased_in_critical_section: Vec<bool>,
}

impl MemFlash {
    pub const SIZE: usize = 512 * 1024;
    pub const ERASE: usize = 4096;
    pub const PAGE: usize = 256;

    pub fn new() -> Self {
        Self {
            data: std::vec![0xFF; Self::SIZE],
            erases: Vec::new(),
            writes: Vec::new(),
            fail_writes: false,
            watch_critical_section: false,
            erased_in_critical_section: Vec::new(),
        }
    }

    /// Whether a critical section is held somewhere: a fresh thread cannot
    /// enter one within a short timeout.
    fn critical_section_held() -> bool {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || critical_section::with(|_| tx.send(()).ok()));
        rx.recv_timeout(Duration::from_millis(50)).is_err()
    }

    fn check(offset: u32, len: usize, align: usize) -> Result<(), NorFlashErrorKind> {
        let offset = offset as usize;
        if offset % align != 0 || len % align != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if offset + len > Self::SIZE {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(())
    }
}

impl ErrorType for MemFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        Self::check(offset, bytes.len(), Self::READ_SIZE)?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        Self::SIZE
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = Self::PAGE;
    const ERASE_SIZE: usize = Self::ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        Self::check(from, (to - from) as usize, Self::ERASE)?;
        if self.watch_critical_section {
            self.erased_in_critical_section
                .push(Self::critical_section_held());
        }
        self.erases.push((from, to));
        self.data[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        Self::check(offset, bytes.len(), Self::PAGE)?;
        self.writes.push((offset, bytes.len()));
        let start = offset as usize;
        for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// One scripted answer to a data-ready query.
#[derive(Debug, Clone, Copy)]
pub enum ReadyStep {
    NotReady,
    Ready,
    Fail,
}

/// Scripted sensor. Each poll consumes one [`ReadyStep`]; each read consumes one
/// measurement result.
#[derive(Debug, Default)]
pub struct MockSensor {
    pub ready: VecDeque<ReadyStep>,
    pub measurements: VecDeque<Result<RawMeasurement, SensorError>>,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub starts: usize,
    pub stops: usize,
    pub polls: usize,
    pub reads: usize,
}

pub const BUS_ERROR: SensorError = SensorError::ReadFailed {
    sensor: "mock",
    operation: "scripted failure",
};

impl MockSensor {
    pub fn measurement(
        co2_ppm: u16,
        temperature_milli_celsius: i32,
        humidity_milli_percent: i32,
    ) -> RawMeasurement {
        RawMeasurement {
            co2_ppm,
            temperature_milli_celsius,
            humidity_milli_percent,
        }
    }
}

impl Co2Sensor for MockSensor {
    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.starts += 1;
        if self.fail_start {
            Err(BUS_ERROR)
        } else {
            Ok(())
        }
    }

    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.polls += 1;
        match self.ready.pop_front().expect("sensor polled past the end of its script") {
            ReadyStep::NotReady => Ok(false),
            ReadyStep::Ready => Ok(true),
            ReadyStep::Fail => Err(BUS_ERROR),
        }
    }

    async fn read_measurement(&mut self) -> Result<RawMeasurement, SensorError> {
        self.reads += 1;
        self.measurements
            .pop_front()
            .expect("sensor read past the end of its script")
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.stops += 1;
        if self.fail_stop {
            Err(BUS_ERROR)
        } else {
            Ok(())
        }
    }
}
