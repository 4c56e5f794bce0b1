//! Desktop simulator for the badger-air acquisition and persistence core.
//!
//! Runs the acquisition worker on its own thread against a synthetic SCD41 and
//! keeps the badge state in a file that stands in for the RP2040's flash, so
//! history and the selected screen survive restarts.
//!
//! ```text
//! badger-simulator [STATE_FILE]
//! ```
//!
//! # Commands (one per line on stdin)
//!
//! | Input | Action                 |
//! |-------|------------------------|
//! | a     | Badge screen           |
//! | b     | Air quality dashboard  |
//! | c     | Contact screen         |
//! | q     | Quit                   |

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant as StdInstant};

use embassy_time::Instant;
use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use log::{error, info, warn};

use badger_core::acquisition::{
    AcquisitionScheduler, AcquisitionShared, AcquisitionWorker, PowerHint, SleepPolicy,
};
use badger_core::app_state::BadgeState;
use badger_core::config::{SHORT_POLL, STATE_FLASH_OFFSET};
use badger_core::sensors::{Co2Sensor, RawMeasurement, SensorError};
use badger_core::storage::{Metric, Screen, StateStore};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_STATE_FILE: &str = "badger-state.bin";

/// Size of the simulated flash: the state region plus one sector.
const FLASH_SIZE: usize = STATE_FLASH_OFFSET as usize + SECTOR_SIZE;
const SECTOR_SIZE: usize = 4096;
const PAGE_SIZE: usize = 256;

/// Main-loop sleep when the core reports nothing pending. On the badge this is
/// where the board powers itself off.
const IDLE_SLEEP: Duration = Duration::from_secs(1);

static ACQUISITION: AcquisitionShared = AcquisitionShared::new();

// ---------------------------------------------------------------------------
// File-backed flash
// ---------------------------------------------------------------------------

/// NOR flash image kept in a file. Bytes past the end of the file read as erased.
struct FileFlash {
    file: File,
}

impl FileFlash {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file })
    }

    fn read_at(&mut self, offset: u32, bytes: &mut [u8]) -> io::Result<()> {
        bytes.fill(0xFF);
        self.file.seek(SeekFrom::Start(offset.into()))?;
        let mut filled = 0;
        while filled < bytes.len() {
            match self.file.read(&mut bytes[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u32, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset.into()))?;
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    fn check(offset: u32, len: usize, align: usize) -> Result<(), NorFlashErrorKind> {
        let offset = offset as usize;
        if offset % align != 0 || len % align != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if offset + len > FLASH_SIZE {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(())
    }
}

fn io_failure(e: io::Error) -> NorFlashErrorKind {
    error!("Flash image I/O failed: {}", e);
    NorFlashErrorKind::Other
}

impl ErrorType for FileFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for FileFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        Self::check(offset, bytes.len(), Self::READ_SIZE)?;
        self.read_at(offset, bytes).map_err(io_failure)
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }
}

impl NorFlash for FileFlash {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        Self::check(from, (to - from) as usize, SECTOR_SIZE)?;
        let erased = vec![0xFF; (to - from) as usize];
        self.write_at(from, &erased).map_err(io_failure)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        Self::check(offset, bytes.len(), PAGE_SIZE)?;
        // Programming can only clear bits
        let mut cells = vec![0u8; bytes.len()];
        self.read_at(offset, &mut cells).map_err(io_failure)?;
        for (cell, byte) in cells.iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        self.write_at(offset, &cells).map_err(io_failure)
    }
}

// ---------------------------------------------------------------------------
// Synthetic sensor
// ---------------------------------------------------------------------------

/// Generates SCD41-like measurements that drift over time.
///
/// Every seventh data-ready query reports "not ready" and every eleventh read
/// returns a zero-CO2 sample, so the worker's retry paths get exercised.
struct MockScd41 {
    started: StdInstant,
    measuring: bool,
    polls: u32,
    reads: u32,
}

impl MockScd41 {
    fn new() -> Self {
        Self {
            started: StdInstant::now(),
            measuring: false,
            polls: 0,
            reads: 0,
        }
    }

    fn sample(&self) -> RawMeasurement {
        let t = self.started.elapsed().as_secs_f64();

        // CO2: 450-1250 ppm, a room slowly filling up and being aired
        let co2 = 850.0 + 400.0 * (t / 300.0).sin() + 30.0 * (t / 41.0).cos();
        // Temperature: 20-26 °C
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        // Humidity: 40-60 %
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        RawMeasurement {
            co2_ppm: co2 as u16,
            temperature_milli_celsius: (temperature * 1000.0) as i32,
            humidity_milli_percent: (humidity * 1000.0) as i32,
        }
    }
}

impl Co2Sensor for MockScd41 {
    async fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.measuring = true;
        Ok(())
    }

    async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.polls += 1;
        Ok(self.measuring && self.polls % 7 != 0)
    }

    async fn read_measurement(&mut self) -> Result<RawMeasurement, SensorError> {
        self.reads += 1;
        if self.reads % 11 == 0 {
            return Ok(RawMeasurement::default());
        }
        Ok(self.sample())
    }

    async fn stop_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.measuring = false;
        Ok(())
    }
}

/// Blocking delay for the worker thread.
struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns.into()));
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

/// Wakes the parked worker thread.
struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// Drive `fut` on the current thread, parking between polls.
fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = std::pin::pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        thread::park();
    }
}

fn spawn_worker() -> io::Result<()> {
    thread::Builder::new()
        .name("acquisition".into())
        .spawn(|| {
            let worker = AcquisitionWorker::new(MockScd41::new(), StdDelay);
            block_on(worker.run(&ACQUISITION));
        })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Input and output
// ---------------------------------------------------------------------------

enum Command {
    Select(Screen),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "a" | "A" => Some(Command::Select(Screen::Badge)),
        "b" | "B" => Some(Command::Select(Screen::AirQuality)),
        "c" | "C" => Some(Command::Select(Screen::Contact)),
        "q" | "Q" => Some(Command::Quit),
        _ => None,
    }
}

/// Read stdin lines on a helper thread so the main loop never blocks on input.
fn spawn_input() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command {:?} (a/b/c/q)", line.trim()),
            }
        }
    });
    rx
}

/// Text stand-in for the e-paper screens.
fn render(state: &BadgeState) {
    let latest = state.latest();
    match state.current_screen() {
        Screen::None => {}
        Screen::Badge => {
            if latest.is_sentinel() {
                info!("[badge] no reading yet");
            } else {
                info!(
                    "[badge] {:.0} ppm  {:.1}°F / {:.1}°C  {:.0}%",
                    latest.co2,
                    latest.temperature_fahrenheit(),
                    latest.temperature,
                    latest.humidity
                );
            }
        }
        Screen::AirQuality => {
            let samples = state.history().valid_chronological();
            info!("[air quality] {} samples, latest {}", samples.len(), latest);
            for metric in [Metric::Co2, Metric::Temperature, Metric::Humidity] {
                if let Some(bounds) = state.history().bounds(metric) {
                    info!(
                        "  {:<4} {:>7.1} .. {:>7.1} {}",
                        metric.label(),
                        bounds.min,
                        bounds.max,
                        metric.unit()
                    );
                }
            }
        }
        Screen::Contact => info!("[contact] scan the QR code on the back"),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
    info!("Starting badger-air simulator, state file {}", path.display());
    info!("Commands: a=Badge  b=AirQuality  c=Contact  q=Quit");

    let flash = match FileFlash::open(&path) {
        Ok(flash) => flash,
        Err(e) => {
            error!("Cannot open {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    let mut store = StateStore::new(flash, STATE_FLASH_OFFSET);
    let mut state = BadgeState::load(&mut store);
    render(&state);

    if let Err(e) = spawn_worker() {
        error!("Cannot start acquisition worker: {}", e);
        std::process::exit(1);
    }
    let commands = spawn_input();
    let mut scheduler = AcquisitionScheduler::new(&ACQUISITION);
    let boot = StdInstant::now();

    loop {
        let mut redraw = false;
        loop {
            match commands.try_recv() {
                Ok(Command::Select(screen)) => {
                    redraw |= state.current_screen() != screen;
                    state.select_screen(screen);
                }
                Ok(Command::Quit) | Err(TryRecvError::Disconnected) => {
                    if let Err(e) = state.flush(&mut store) {
                        error!("Final flush failed: {}", e);
                    }
                    info!("Bye");
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let now = Instant::from_millis(boot.elapsed().as_millis() as u64);
        let report = state.service(&mut scheduler, &mut store, now, SleepPolicy::WaitForWorker);
        if report.recorded.is_some() || redraw {
            render(&state);
        }

        match report.power {
            PowerHint::ShortPoll => thread::sleep(Duration::from_millis(SHORT_POLL.as_millis())),
            PowerHint::Halt => thread::sleep(IDLE_SLEEP),
        }
    }
}
