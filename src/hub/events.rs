//! Event register: a small set of named boolean facts shared by every task.

use core::cell::RefCell;
use core::future::poll_fn;
use core::ops::{BitAnd, BitOr, Not};
use core::task::Poll;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{Duration, with_timeout};

/// Number of tasks that can wait on the register at the same time. Further
/// waiters are still served; registering past this wakes everyone early and
/// they re-register on the next poll.
const MAX_WAITERS: usize = 8;

/// A set of event facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventBits(pub u32);

impl EventBits {
    pub const NONE: Self = Self(0);
    /// The station interface holds an IP address.
    pub const STATION_LINKED: Self = Self(1 << 0);
    /// At least one client is attached to the local access point.
    pub const ACCESS_POINT_LINKED: Self = Self(1 << 1);
    /// Some interface (station or wired) provides connectivity.
    pub const UPLINK: Self = Self(1 << 2);
    /// Wall-clock time has been synchronized.
    pub const TIME_SYNCHRONIZED: Self = Self(1 << 3);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for EventBits {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventBits {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

struct State {
    bits: EventBits,
    waiters: MultiWakerRegistration<MAX_WAITERS>,
}

/// Bitset of facts with set, clear, snapshot and bounded wait.
///
/// Bits only describe the current instant: a reader must not assume a bit
/// stays set between two reads.
pub struct EventRegister {
    state: Mutex<CriticalSectionRawMutex, RefCell<State>>,
}

impl Default for EventRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegister {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                bits: EventBits::NONE,
                waiters: MultiWakerRegistration::new(),
            })),
        }
    }

    /// Sets every bit in `mask` and wakes the waiters.
    pub fn set_bits(&self, mask: EventBits) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.bits = state.bits | mask;
            state.waiters.wake();
        });
    }

    /// Clears every bit in `mask`.
    pub fn clear_bits(&self, mask: EventBits) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.bits = state.bits & !mask;
        });
    }

    /// Sets or clears `mask` depending on `value`.
    pub fn assign(&self, mask: EventBits, value: bool) {
        if value {
            self.set_bits(mask);
        } else {
            self.clear_bits(mask);
        }
    }

    /// Snapshot of all bits.
    pub fn get_bits(&self) -> EventBits {
        self.state.lock(|state| state.borrow().bits)
    }

    pub fn is_set(&self, mask: EventBits) -> bool {
        self.get_bits().contains(mask)
    }

    /// Waits up to `timeout` for the bits in `mask`.
    ///
    /// With `require_all` every bit of `mask` must be set, otherwise any one of
    /// them is enough. Returns the bits of `mask` observed when the wait ended;
    /// on timeout that is whatever subset happened to be set. With
    /// `clear_on_exit` the matched bits are cleared atomically on success.
    pub async fn wait_bits(
        &self,
        mask: EventBits,
        clear_on_exit: bool,
        require_all: bool,
        timeout: Duration,
    ) -> EventBits {
        let wait = poll_fn(|cx| {
            self.state.lock(|state| {
                let mut state = state.borrow_mut();
                let matched = state.bits & mask;
                let satisfied = if require_all {
                    matched == mask
                } else {
                    !matched.is_empty()
                };
                if satisfied {
                    if clear_on_exit {
                        state.bits = state.bits & !matched;
                    }
                    Poll::Ready(matched)
                } else {
                    state.waiters.register(cx.waker());
                    Poll::Pending
                }
            })
        });

        match with_timeout(timeout, wait).await {
            Ok(bits) => bits,
            Err(_) => self.get_bits() & mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;

    #[test]
    fn set_then_clear_is_exact() {
        let register = EventRegister::new();
        register.set_bits(EventBits::TIME_SYNCHRONIZED);

        let mask = EventBits::UPLINK | EventBits::STATION_LINKED;
        register.set_bits(mask);
        assert_eq!(register.get_bits() & mask, mask);

        register.clear_bits(mask);
        assert!(!register.get_bits().intersects(mask));
        assert!(register.is_set(EventBits::TIME_SYNCHRONIZED));
    }

    #[test]
    fn wait_returns_immediately_when_bits_are_set() {
        let register = EventRegister::new();
        register.set_bits(EventBits::UPLINK);

        let observed = block_on(register.wait_bits(
            EventBits::UPLINK | EventBits::TIME_SYNCHRONIZED,
            false,
            false,
            Duration::from_millis(0),
        ));
        assert_eq!(observed, EventBits::UPLINK);
    }

    #[test]
    fn wait_for_all_times_out_with_partial_bits() {
        let register = EventRegister::new();
        register.set_bits(EventBits::UPLINK);

        let observed = block_on(register.wait_bits(
            EventBits::UPLINK | EventBits::TIME_SYNCHRONIZED,
            false,
            true,
            Duration::from_millis(10),
        ));
        assert_eq!(observed, EventBits::UPLINK);
    }

    #[test]
    fn waiter_is_woken_by_set_and_clears_on_exit() {
        let register = EventRegister::new();

        let (observed, ()) = block_on(join(
            register.wait_bits(
                EventBits::TIME_SYNCHRONIZED,
                true,
                true,
                Duration::from_secs(5),
            ),
            async {
                Timer::after_millis(5).await;
                register.set_bits(EventBits::TIME_SYNCHRONIZED);
            },
        ));

        assert_eq!(observed, EventBits::TIME_SYNCHRONIZED);
        assert!(!register.is_set(EventBits::TIME_SYNCHRONIZED));
    }
}
