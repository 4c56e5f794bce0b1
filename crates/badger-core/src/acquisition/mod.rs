//! Cross-context sensor acquisition
//!
//! The main context owns an [`AcquisitionScheduler`]; a second execution context
//! (core1 on the badge, a thread in the simulator) runs an
//! [`AcquisitionWorker`]. The only state they share lives in one
//! [`AcquisitionShared`]: the handoff queue, the in-flight flag and the launch
//! signal.
//!
//! ```rust,ignore
//! static ACQUISITION: AcquisitionShared = AcquisitionShared::new();
//!
//! // worker context
//! AcquisitionWorker::new(sensor, Delay).run(&ACQUISITION).await;
//!
//! // main context
//! let mut scheduler = AcquisitionScheduler::new(&ACQUISITION);
//! scheduler.maybe_start(Instant::now());
//! if let Some(reading) = scheduler.poll_result() { /* record it */ }
//! ```

pub mod queue;
pub mod scheduler;
pub mod worker;

pub use queue::{HandoffQueue, QueueFull};
pub use scheduler::{AcquisitionScheduler, PowerHint, SleepPolicy, StartOutcome};
pub use worker::AcquisitionWorker;

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// State crossing the boundary between the main and the worker context.
///
/// Only plain atomic loads and stores are used on the flag; the RP2040 has no
/// atomic read-modify-write instructions.
pub struct AcquisitionShared {
    queue: HandoffQueue,
    /// Set by the scheduler on launch, cleared by the worker when the attempt ends.
    active: AtomicBool,
    launch: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for AcquisitionShared {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionShared {
    pub const fn new() -> Self {
        Self {
            queue: HandoffQueue::new(),
            active: AtomicBool::new(false),
            launch: Signal::new(),
        }
    }

    pub fn queue(&self) -> &HandoffQueue {
        &self.queue
    }

    /// Whether an attempt is in flight.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn mark_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn mark_idle(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn request_launch(&self) {
        self.launch.signal(());
    }

    /// Park the worker context until the scheduler asks for an attempt.
    pub async fn wait_for_launch(&self) {
        self.launch.wait().await
    }
}
