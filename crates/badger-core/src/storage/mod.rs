//! Persistent badge state: the reading history, the record format and the
//! flash-backed store.

pub mod history;
pub mod state;
pub mod store;

pub use history::{Metric, Reading, ReadingHistory, SeriesBounds};
pub use state::{PersistedState, Screen};
pub use store::{FlashExclusion, StateStore, StoreError};
