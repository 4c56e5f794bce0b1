//! Single-slot state store on a reserved region of NOR flash.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::state::PersistedState;
use crate::config::{MAX_CONSECUTIVE_SAVE_FAILURES, STATE_RECORD_LEN};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("flash operation failed: {0:?}")]
    Flash(NorFlashErrorKind),
    #[error("state record does not fit the encode buffer")]
    Encode,
    #[error("state region {offset:#x}+{len:#x} exceeds flash capacity {capacity:#x}")]
    RegionOutOfBounds {
        offset: u32,
        len: usize,
        capacity: usize,
    },
    #[error("persistence disabled after repeated write failures")]
    ReadOnly,
}

/// Who keeps the rest of the system off the flash while it is erased and programmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashExclusion {
    /// The store wraps erase and program in `critical_section::with`.
    #[default]
    CriticalSection,
    /// The flash implementation does it itself. `embassy_rp::flash::Flash` runs
    /// its operations from RAM with core1 paused and interrupts masked; an outer
    /// critical section would hold the spinlock core1 needs to acknowledge the
    /// pause.
    Driver,
}

/// Reads and writes [`PersistedState`] at a fixed flash offset.
///
/// There is one slot and no wear-leveling; writes are rare because callers only
/// flush when their state is dirty. The flash being written is usually the one
/// the program executes from, so erase and program run with exclusive access
/// (see [`FlashExclusion`]).
///
/// A failed save leaves the old record (or an erased region) behind. After
/// [`MAX_CONSECUTIVE_SAVE_FAILURES`] failures in a row the store gives up and
/// refuses further writes for the rest of the session.
pub struct StateStore<F> {
    flash: F,
    offset: u32,
    exclusion: FlashExclusion,
    consecutive_failures: u8,
    read_only: bool,
}

impl<F: NorFlash> StateStore<F> {
    /// `offset` must be aligned to `F::ERASE_SIZE`.
    pub fn new(flash: F, offset: u32) -> Self {
        Self {
            flash,
            offset,
            exclusion: FlashExclusion::default(),
            consecutive_failures: 0,
            read_only: false,
        }
    }

    pub fn with_exclusion(mut self, exclusion: FlashExclusion) -> Self {
        self.exclusion = exclusion;
        self
    }

    /// Load the stored state, or the default state if there is no valid record.
    ///
    /// An erased, corrupt or foreign region is indistinguishable from a first
    /// boot; nothing is reported beyond a log line.
    pub fn load(&mut self) -> PersistedState {
        let mut buf = [0u8; STATE_RECORD_LEN];
        if let Err(e) = self.flash.read(self.offset, &mut buf) {
            warn!("Failed to read state region: {:?}", e.kind());
            return PersistedState::default();
        }

        match PersistedState::decode(&buf) {
            Some(state) => {
                info!(
                    "Loaded state: screen {:?}, reading index {}",
                    state.current_screen,
                    state.history.reading_index()
                );
                state
            }
            None => {
                info!("No valid state record, starting from defaults");
                PersistedState::default()
            }
        }
    }

    /// Erase the state region and program `state` into it.
    pub fn save(&mut self, state: &PersistedState) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let result = self.write_record(state);
        match result {
            Ok(()) => self.consecutive_failures = 0,
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                error!(
                    "Saving state failed ({} in a row): {}",
                    self.consecutive_failures, e
                );
                if self.consecutive_failures >= MAX_CONSECUTIVE_SAVE_FAILURES {
                    error!("Disabling state persistence for this session");
                    self.read_only = true;
                }
            }
        }
        result
    }

    /// Whether the store has stopped writing after repeated failures.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Give the flash back.
    pub fn release(self) -> F {
        self.flash
    }

    fn write_record(&mut self, state: &PersistedState) -> Result<(), StoreError> {
        // Unused tail stays in the erased state.
        let mut buf = [0xFFu8; STATE_RECORD_LEN];
        let used = state.encode(&mut buf).map_err(|_| StoreError::Encode)?;

        let program_len = align_up(used, F::WRITE_SIZE);
        let erase_len = align_up(program_len, F::ERASE_SIZE);
        if program_len > buf.len() {
            return Err(StoreError::Encode);
        }

        let capacity = self.flash.capacity();
        if self.offset as usize + erase_len > capacity {
            return Err(StoreError::RegionOutOfBounds {
                offset: self.offset,
                len: erase_len,
                capacity,
            });
        }

        let from = self.offset;
        let to = from + erase_len as u32;
        debug!(
            "Writing state: erase {:#x}..{:#x}, program {} bytes",
            from, to, program_len
        );

        let flash = &mut self.flash;
        let mut program = || {
            flash.erase(from, to)?;
            flash.write(from, &buf[..program_len])
        };
        let result = match self.exclusion {
            FlashExclusion::CriticalSection => critical_section::with(|_| program()),
            FlashExclusion::Driver => program(),
        };
        result.map_err(|e| StoreError::Flash(e.kind()))
    }
}

fn align_up(len: usize, granularity: usize) -> usize {
    len.div_ceil(granularity) * granularity
}
