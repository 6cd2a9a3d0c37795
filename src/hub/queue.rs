//! Bounded FIFO channels with timeout semantics.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use core::future::poll_fn;

use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{Duration, with_timeout};

/// Fixed-capacity FIFO used for every cross-task handoff.
///
/// Capacity and item type are fixed at compile time, so a queue is created by
/// declaring it, usually in a `static`.
pub struct BoundedQueue<T, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Sends `item`, waiting up to `timeout` for a free slot.
    ///
    /// Returns `false` if the queue stayed full; the item is dropped.
    pub async fn send(&self, item: T, timeout: Duration) -> bool {
        with_timeout(timeout, self.channel.send(item)).await.is_ok()
    }

    /// Receives the oldest item, waiting up to `timeout` for one to arrive.
    pub async fn receive(&self, timeout: Duration) -> Option<T> {
        with_timeout(timeout, self.channel.receive()).await.ok()
    }

    /// Sends without waiting, handing the item back if the queue is full.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        self.channel
            .try_send(item)
            .map_err(|TrySendError::Full(item)| item)
    }

    pub fn try_receive(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        self.channel.clear();
    }

    /// Waits up to `timeout` until the queue has a free slot. Another sender
    /// may still take that slot first.
    pub async fn wait_for_space(&self, timeout: Duration) -> bool {
        with_timeout(timeout, poll_fn(|cx| self.channel.poll_ready_to_send(cx)))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn send_times_out_when_full() {
        let queue = BoundedQueue::<u8, 1>::new();
        assert!(block_on(queue.send(1, Duration::from_millis(10))));
        assert!(!block_on(queue.send(2, Duration::from_millis(10))));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn receive_is_fifo_and_times_out_when_empty() {
        let queue = BoundedQueue::<u8, 4>::new();
        queue.try_send(1).unwrap();
        queue.try_send(2).unwrap();

        assert_eq!(block_on(queue.receive(Duration::from_millis(10))), Some(1));
        assert_eq!(block_on(queue.receive(Duration::from_millis(10))), Some(2));
        assert_eq!(block_on(queue.receive(Duration::from_millis(10))), None);
    }

    #[test]
    fn try_send_hands_item_back() {
        let queue = BoundedQueue::<u8, 1>::new();
        queue.try_send(7).unwrap();
        assert_eq!(queue.try_send(8), Err(8));
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn wait_for_space_wakes_when_a_slot_frees() {
        let queue = BoundedQueue::<u8, 1>::new();
        queue.try_send(1).unwrap();
        assert!(!block_on(queue.wait_for_space(Duration::from_millis(5))));

        let (freed, taken) = block_on(embassy_futures::join::join(
            queue.wait_for_space(Duration::from_millis(200)),
            async {
                embassy_time::Timer::after_millis(5).await;
                queue.try_receive()
            },
        ));
        assert!(freed);
        assert_eq!(taken, Some(1));
    }
}
