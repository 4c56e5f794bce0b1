//! Compile-time tuning for acquisition and persistence.

use embassy_time::Duration;

/// Delay between two data-ready queries while the worker polls the sensor.
/// The SCD41 produces a sample every 5 seconds in periodic mode.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum time between two acquisition attempts.
pub const MIN_GAP: Duration = Duration::from_secs(10);

/// How many times the worker tries to hand a finished reading over before dropping it.
pub const PUBLISH_ATTEMPTS: u32 = 10;

/// Backoff unit between publish attempts, multiplied by the attempts remaining.
pub const PUBLISH_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Capacity of the worker -> scheduler handoff queue.
pub const QUEUE_CAPACITY: usize = 2;

/// Number of readings retained in the persisted history ring.
pub const HISTORY_CAPACITY: usize = 32;

/// Offset of the reserved state region from the start of flash (256 KiB).
pub const STATE_FLASH_OFFSET: u32 = 256 * 1024;

/// Size of the in-RAM buffer a record is encoded into before programming.
/// Must be a multiple of the flash write granularity.
pub const STATE_RECORD_LEN: usize = 512;

/// Consecutive failed saves after which the store stops writing for the session.
pub const MAX_CONSECUTIVE_SAVE_FAILURES: u8 = 3;

/// Main-loop sleep while an acquisition is in flight.
pub const SHORT_POLL: Duration = Duration::from_millis(50);
