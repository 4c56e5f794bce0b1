//! Main-context side of acquisition: rate limiting, launch and power hints.

use embassy_time::Instant;
use log::{debug, info};

use super::AcquisitionShared;
use crate::config::MIN_GAP;
use crate::storage::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new attempt was launched.
    Started,
    /// The previous attempt started less than [`MIN_GAP`] ago.
    TooSoon,
    /// An attempt is still in flight.
    Busy,
}

/// How eagerly the main loop may cut power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SleepPolicy {
    /// Stay awake until an in-flight attempt has delivered its reading.
    #[default]
    WaitForWorker,
    /// Halt once the queue is drained; an in-flight reading is lost.
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerHint {
    /// Sleep briefly and check the queue again.
    ShortPoll,
    /// Nothing pending; the board may power down.
    Halt,
}

pub struct AcquisitionScheduler<'a> {
    shared: &'a AcquisitionShared,
    /// Milliseconds since boot of the last launch.
    last_attempt_ms: Option<u32>,
}

impl<'a> AcquisitionScheduler<'a> {
    pub const fn new(shared: &'a AcquisitionShared) -> Self {
        Self {
            shared,
            last_attempt_ms: None,
        }
    }

    /// Launch an attempt unless one is in flight or the last one was too recent.
    pub fn maybe_start(&mut self, now: Instant) -> StartOutcome {
        if self.shared.is_active() {
            debug!("Acquisition still in flight");
            return StartOutcome::Busy;
        }

        let now_ms = now.as_millis() as u32;
        if let Some(last) = self.last_attempt_ms {
            let elapsed = now_ms.wrapping_sub(last);
            if elapsed <= MIN_GAP.as_millis() as u32 {
                debug!("Last acquisition {} ms ago, skipping", elapsed);
                return StartOutcome::TooSoon;
            }
        }

        // Flag before signal, so the worker never runs with it clear
        self.shared.mark_active();
        self.last_attempt_ms = Some(now_ms);
        self.shared.request_launch();
        info!("Acquisition launched at {} ms", now_ms);
        StartOutcome::Started
    }

    /// Take a finished reading, if there is one.
    pub fn poll_result(&self) -> Option<Reading> {
        self.shared.queue().try_pop()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Launch time of the last attempt, `None` before the first one.
    pub fn last_attempt_ms(&self) -> Option<u32> {
        self.last_attempt_ms
    }

    pub fn power_hint(&self, policy: SleepPolicy) -> PowerHint {
        if !self.shared.queue().is_empty() {
            return PowerHint::ShortPoll;
        }
        match policy {
            SleepPolicy::WaitForWorker if self.is_active() => PowerHint::ShortPoll,
            _ => PowerHint::Halt,
        }
    }
}
