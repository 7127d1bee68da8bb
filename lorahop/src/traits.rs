//! Collaborator capabilities consumed by a node.
//!
//! The forwarding engine never touches a radio, a clock or a timer wheel
//! directly. It is driven through four small traits so the same code runs on:
//! - Real hardware (LoRa modem driver, RTC, embassy timers)
//! - The discrete-event simulator in `lorahop-sim`
//! - The in-memory mocks in [`test_impls`]
//!
//! Every callback on a node is serialized by its driver, so none of these
//! traits need to be `Sync`.

use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::config::{DefaultConfig, ProtocolConfig};
use crate::time::{Duration, Timestamp};
use crate::types::{Event, LogicalId};

/// Queue size for the event channel.
///
/// `stop()` reports every open window in one callback, so the queue holds a
/// full default cache of them plus room for the callback's other events.
/// Configs with a larger `MAX_SEEN` can still overflow; lost events are
/// counted in [`NodeMetrics::events_dropped`](crate::types::NodeMetrics).
pub(crate) const EVENT_QUEUE_SIZE: usize = DefaultConfig::MAX_SEEN + 32;

/// Mutex type used for channels.
///
/// A node is driven by one cooperative callback at a time.
pub(crate) type ChannelMutex = NoopRawMutex;

/// Terminal-outcome channel drained by the embedding application.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Work a node asked to be called back for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Listening window for `logical_id` has elapsed.
    WindowClose { logical_id: LogicalId },
    /// Time to originate the next packet.
    Send,
}

/// Opaque cancellation handle returned by [`Scheduler::schedule_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

/// Broadcast radio.
///
/// Fire-and-forget: at most one delivery attempt per call, no acknowledgment.
/// Received frames are pushed into the node by the driver through
/// [`Node::handle_rx`](crate::Node::handle_rx).
///
/// ```
/// use lorahop::traits::test_impls::MockTransport;
/// use lorahop::Transport;
///
/// let mut transport = MockTransport::new();
/// assert_eq!(transport.mtu(), 255);
///
/// transport.broadcast(vec![1, 2, 3]);
/// assert_eq!(transport.take_sent(), vec![vec![1, 2, 3]]);
/// ```
pub trait Transport {
    /// Largest frame the radio accepts (LoRa: 255 bytes).
    fn mtu(&self) -> usize;

    /// Send `frame` to every node in range.
    fn broadcast(&mut self, frame: Vec<u8>);
}

/// Time source for real or simulated time.
///
/// ```
/// use lorahop::traits::test_impls::MockClock;
/// use lorahop::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_millis(61));
/// assert_eq!(clock.now().as_millis(), 61);
/// ```
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// One-shot timer registration.
///
/// The scheduler later hands the same [`Timer`] back to
/// [`Node::handle_timer`](crate::Node::handle_timer). Timers due at the same
/// instant must be delivered in registration order.
pub trait Scheduler {
    /// Arrange for `timer` to fire once, `delay` from now.
    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle;

    /// Best-effort cancellation. A timer the driver has already committed
    /// may still be delivered.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Random number generator.
///
/// Seeded once per node; used for window durations.
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;

    /// Uniform duration in `[min, max]`, both ends inclusive.
    fn gen_duration(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let ms = self.gen_range(min.as_millis(), max.as_millis().saturating_add(1));
        Duration::from_millis(ms)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use core::cell::Cell;

    use super::*;
    use crate::types::LORA_MTU;

    /// Records every broadcast frame.
    pub struct MockTransport {
        mtu: usize,
        sent: Vec<Vec<u8>>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::with_mtu(LORA_MTU)
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_mtu(mtu: usize) -> Self {
            Self {
                mtu,
                sent: Vec::new(),
            }
        }

        /// Take all frames broadcast so far, oldest first.
        pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
            core::mem::take(&mut self.sent)
        }

        pub fn sent_count(&self) -> usize {
            self.sent.len()
        }
    }

    impl Transport for MockTransport {
        fn mtu(&self) -> usize {
            self.mtu
        }

        fn broadcast(&mut self, frame: Vec<u8>) {
            self.sent.push(frame);
        }
    }

    /// Mock clock for testing (time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        /// Jump to the given timestamp.
        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        /// Advance time by the given duration.
        pub fn advance(&self, duration: Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            self.current.get()
        }
    }

    /// A timer registered with [`MockScheduler`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScheduledTimer {
        pub handle: TimerHandle,
        pub delay: Duration,
        pub timer: Timer,
    }

    /// Records registrations; tests fire timers by hand.
    #[derive(Default)]
    pub struct MockScheduler {
        next_handle: u64,
        pending: Vec<ScheduledTimer>,
        cancelled: Vec<TimerHandle>,
    }

    impl MockScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registrations not yet cancelled or taken, in registration order.
        pub fn pending(&self) -> &[ScheduledTimer] {
            &self.pending
        }

        /// Handles passed to `cancel`, in call order.
        pub fn cancelled(&self) -> &[TimerHandle] {
            &self.cancelled
        }

        /// Remove and return the oldest pending registration of `timer`.
        pub fn take(&mut self, timer: Timer) -> Option<ScheduledTimer> {
            let idx = self.pending.iter().position(|s| s.timer == timer)?;
            Some(self.pending.remove(idx))
        }
    }

    impl Scheduler for MockScheduler {
        fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
            let handle = TimerHandle(self.next_handle);
            self.next_handle += 1;
            self.pending.push(ScheduledTimer {
                handle,
                delay,
                timer,
            });
            handle
        }

        fn cancel(&mut self, handle: TimerHandle) {
            self.pending.retain(|s| s.handle != handle);
            self.cancelled.push(handle);
        }
    }

    /// Mock random for testing (deterministic).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            // Simple LCG
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max.saturating_sub(min);
            if range == 0 {
                return min;
            }
            min + (self.state % range)
        }
    }
}
