//! Bounded handoff of finished readings from the worker to the scheduler.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal_async::delay::DelayNs;
use log::debug;
use thiserror_no_std::Error;

use crate::config::{PUBLISH_ATTEMPTS, PUBLISH_BACKOFF_STEP, QUEUE_CAPACITY};
use crate::storage::Reading;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handoff queue is full")]
pub struct QueueFull;

/// Single-producer, single-consumer FIFO of [`Reading`]s.
///
/// Two slots are enough to hold one unconsumed result while the next attempt
/// completes; a full queue means the consumer has stalled. Neither side ever
/// blocks.
pub struct HandoffQueue {
    channel: Channel<CriticalSectionRawMutex, Reading, QUEUE_CAPACITY>,
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    pub fn try_push(&self, reading: Reading) -> Result<(), QueueFull> {
        self.channel.try_send(reading).map_err(|_| QueueFull)
    }

    pub fn try_pop(&self) -> Option<Reading> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    /// Push `reading`, backing off while the queue is full.
    ///
    /// Makes [`PUBLISH_ATTEMPTS`] attempts, sleeping
    /// `PUBLISH_BACKOFF_STEP * attempts_remaining` after each failed one, so the
    /// waits shrink from 1 s down to 100 ms.
    pub async fn publish_with_backoff<D: DelayNs>(
        &self,
        reading: Reading,
        delay: &mut D,
    ) -> Result<(), QueueFull> {
        for remaining in (1..=PUBLISH_ATTEMPTS).rev() {
            if self.try_push(reading).is_ok() {
                return Ok(());
            }
            let backoff_ms = PUBLISH_BACKOFF_STEP.as_millis() as u32 * remaining;
            debug!("Handoff queue full, retrying in {} ms", backoff_ms);
            delay.delay_ms(backoff_ms).await;
        }
        Err(QueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockDelay, block_on};

    fn reading(co2: f32) -> Reading {
        Reading::new(co2, 21.0, 40.0)
    }

    #[test]
    fn test_fifo_order() {
        let queue = HandoffQueue::new();
        queue.try_push(reading(400.0)).unwrap();
        queue.try_push(reading(500.0)).unwrap();

        assert_eq!(queue.try_pop(), Some(reading(400.0)));
        assert_eq!(queue.try_pop(), Some(reading(500.0)));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_push_fails_at_capacity() {
        let queue = HandoffQueue::new();
        queue.try_push(reading(400.0)).unwrap();
        queue.try_push(reading(500.0)).unwrap();

        assert!(queue.is_full());
        assert_eq!(queue.try_push(reading(600.0)), Err(QueueFull));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_pop_on_empty_is_none() {
        let queue = HandoffQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_third_publish_exhausts_retries_then_succeeds_after_pop() {
        let queue = HandoffQueue::new();
        let mut delay = MockDelay::default();

        block_on(queue.publish_with_backoff(reading(401.0), &mut delay)).unwrap();
        block_on(queue.publish_with_backoff(reading(402.0), &mut delay)).unwrap();
        assert!(delay.calls_ms.is_empty(), "no backoff while there is room");

        let third = block_on(queue.publish_with_backoff(reading(403.0), &mut delay));
        assert_eq!(third, Err(QueueFull));
        assert_eq!(
            delay.calls_ms,
            std::vec![1000, 900, 800, 700, 600, 500, 400, 300, 200, 100]
        );

        assert_eq!(queue.try_pop(), Some(reading(401.0)));
        delay.calls_ms.clear();
        block_on(queue.publish_with_backoff(reading(404.0), &mut delay)).unwrap();
        assert!(delay.calls_ms.is_empty());

        assert_eq!(queue.try_pop(), Some(reading(402.0)));
        assert_eq!(queue.try_pop(), Some(reading(404.0)));
    }
}
