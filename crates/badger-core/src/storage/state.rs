//! The single record kept in flash and its binary format.
//!
//! Layout (little-endian):
//! - magic: 2 bytes (u16, [`PersistedState::MAGIC`])
//! - body: postcard encoding of the fields in declared order
//!   - current_screen: 1 byte (variant index)
//!   - readings: 32 × 12 bytes (co2, temperature, humidity as f32)
//!   - reading_index: 1 byte
//!
//! Any change to the shape of the body must bump the magic, so records written
//! by an older build are treated as absent instead of being misparsed.

use log::warn;
use serde::{Deserialize, Serialize};

use super::history::{Reading, ReadingHistory};

/// Size of the magic tag that prefixes every record.
const MAGIC_LEN: usize = 2;

/// UI mode selected on the badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Screen {
    None,
    #[default]
    Badge,
    AirQuality,
    Contact,
}

/// Everything that survives a power cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub current_screen: Screen,
    pub history: ReadingHistory,
}

impl PersistedState {
    /// Format tag of the current record layout.
    pub const MAGIC: u16 = 0x6023;

    pub fn latest(&self) -> Reading {
        self.history.latest()
    }

    /// Serialize into `buf`, returning the number of bytes used.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, postcard::Error> {
        if buf.len() < MAGIC_LEN {
            return Err(postcard::Error::SerializeBufferFull);
        }
        let (magic, body) = buf.split_at_mut(MAGIC_LEN);
        magic.copy_from_slice(&Self::MAGIC.to_le_bytes());
        let used = postcard::to_slice(self, body)?.len();
        Ok(MAGIC_LEN + used)
    }

    /// Parse a record, or `None` if `bytes` does not hold one written by this build.
    ///
    /// The magic is checked before the body is looked at. Bytes past the end of
    /// the record (erased flash, padding) are ignored.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (magic, body) = bytes.split_at_checked(MAGIC_LEN)?;
        let magic = u16::from_le_bytes([magic[0], magic[1]]);
        if magic != Self::MAGIC {
            warn!(
                "State record magic {:#06x} does not match {:#06x}",
                magic,
                Self::MAGIC
            );
            return None;
        }

        let state: Self = postcard::from_bytes(body)
            .inspect_err(|e| warn!("State record body is malformed: {:?}", e))
            .ok()?;

        if !state.history.is_consistent() {
            warn!(
                "State record reading index {} is out of range",
                state.history.reading_index()
            );
            return None;
        }
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HISTORY_CAPACITY, STATE_RECORD_LEN};

    fn populated() -> PersistedState {
        let mut state = PersistedState {
            current_screen: Screen::AirQuality,
            ..Default::default()
        };
        for n in 0..40 {
            state
                .history
                .record(Reading::new(400.0 + n as f32, 21.5, 48.25));
        }
        state
    }

    #[test]
    fn test_default_state() {
        let state = PersistedState::default();
        assert_eq!(state.current_screen, Screen::Badge);
        assert_eq!(state.history.reading_index(), 0);
        assert!(state.latest().is_sentinel());
    }

    #[test]
    fn test_record_starts_with_little_endian_magic() {
        let mut buf = [0u8; STATE_RECORD_LEN];
        PersistedState::default().encode(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0x23, 0x60]);
    }

    #[test]
    fn test_record_size_is_fixed() {
        let mut buf = [0u8; STATE_RECORD_LEN];
        let empty = PersistedState::default().encode(&mut buf).unwrap();
        let full = populated().encode(&mut buf).unwrap();
        // magic + screen + readings + index
        assert_eq!(empty, 2 + 1 + HISTORY_CAPACITY * 12 + 1);
        assert_eq!(empty, full);
    }

    #[test]
    fn test_decode_returns_what_was_encoded() {
        let state = populated();
        let mut buf = [0xFFu8; STATE_RECORD_LEN];
        state.encode(&mut buf).unwrap();

        assert_eq!(PersistedState::decode(&buf), Some(state));
    }

    #[test]
    fn test_decode_rejects_wrong_magic() {
        let mut buf = [0u8; STATE_RECORD_LEN];
        populated().encode(&mut buf).unwrap();
        buf[0] = 0x22; // the previous layout's tag

        assert_eq!(PersistedState::decode(&buf), None);
        assert_eq!(PersistedState::decode(&[0u8; STATE_RECORD_LEN]), None);
        assert_eq!(PersistedState::decode(&[0xFFu8; STATE_RECORD_LEN]), None);
        assert_eq!(PersistedState::decode(&[0x23]), None);
    }

    #[test]
    fn test_decode_rejects_unknown_screen() {
        let mut buf = [0u8; STATE_RECORD_LEN];
        PersistedState::default().encode(&mut buf).unwrap();
        buf[2] = 9;

        assert_eq!(PersistedState::decode(&buf), None);
    }

    #[test]
    fn test_decode_rejects_out_of_range_index() {
        let mut buf = [0u8; STATE_RECORD_LEN];
        let used = PersistedState::default().encode(&mut buf).unwrap();
        buf[used - 1] = HISTORY_CAPACITY as u8;

        assert_eq!(PersistedState::decode(&buf), None);
    }

    #[test]
    fn test_encode_into_short_buffer_fails() {
        let mut buf = [0u8; 64];
        assert!(populated().encode(&mut buf).is_err());
        assert!(populated().encode(&mut buf[..1]).is_err());
    }
}
