//! Main-context session state
//!
//! [`BadgeState`] owns the in-memory copy of the persisted record and decides
//! when it goes back to flash. Everything here runs in the main context only;
//! the worker never touches the history.

use embassy_time::Instant;
use embedded_storage::nor_flash::NorFlash;
use log::{debug, error, info};

use crate::acquisition::{AcquisitionScheduler, PowerHint, SleepPolicy, StartOutcome};
use crate::storage::{PersistedState, Reading, ReadingHistory, Screen, StateStore, StoreError};

/// What one [`BadgeState::service`] pass did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceReport {
    pub start: StartOutcome,
    /// The newest reading taken from the queue on this pass.
    pub recorded: Option<Reading>,
    /// Whether the state was written to flash.
    pub saved: bool,
    pub power: PowerHint,
}

#[derive(Debug, Default)]
pub struct BadgeState {
    persisted: PersistedState,
    dirty: bool,
}

impl BadgeState {
    /// Boot path: restore whatever the store holds, or defaults.
    pub fn load<F: NorFlash>(store: &mut StateStore<F>) -> Self {
        Self {
            persisted: store.load(),
            dirty: false,
        }
    }

    /// Apply a screen change requested by the input handler.
    pub fn select_screen(&mut self, screen: Screen) {
        if self.persisted.current_screen == screen {
            return;
        }
        info!(
            "Screen {:?} -> {:?}",
            self.persisted.current_screen, screen
        );
        self.persisted.current_screen = screen;
        self.dirty = true;
    }

    pub fn record_reading(&mut self, reading: Reading) {
        self.persisted.history.record(reading);
        self.dirty = true;
    }

    /// Save the state if it changed since the last successful save.
    ///
    /// Returns `Ok(false)` without touching flash when there is nothing to
    /// write. On error the state stays dirty so the next flush retries.
    pub fn flush<F: NorFlash>(&mut self, store: &mut StateStore<F>) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }
        store.save(&self.persisted)?;
        self.dirty = false;
        debug!("State flushed");
        Ok(true)
    }

    /// One pass of the non-rendering half of the main loop.
    ///
    /// Starts an acquisition if one is due, records any finished readings,
    /// flushes and tells the caller how it may sleep.
    pub fn service<F: NorFlash>(
        &mut self,
        scheduler: &mut AcquisitionScheduler<'_>,
        store: &mut StateStore<F>,
        now: Instant,
        policy: SleepPolicy,
    ) -> ServiceReport {
        let start = scheduler.maybe_start(now);

        let mut recorded = None;
        while let Some(reading) = scheduler.poll_result() {
            self.record_reading(reading);
            recorded = Some(reading);
        }

        let saved = match self.flush(store) {
            Ok(saved) => saved,
            Err(e) => {
                error!("Flush failed: {}", e);
                false
            }
        };

        ServiceReport {
            start,
            recorded,
            saved,
            power: scheduler.power_hint(policy),
        }
    }

    pub fn current_screen(&self) -> Screen {
        self.persisted.current_screen
    }

    pub fn history(&self) -> &ReadingHistory {
        &self.persisted.history
    }

    pub fn latest(&self) -> Reading {
        self.persisted.latest()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn persisted(&self) -> &PersistedState {
        &self.persisted
    }
}
