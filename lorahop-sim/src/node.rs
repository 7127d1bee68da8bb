//! SimNode wrapper for simulated lorahop nodes.

use std::cell::Cell;

use lorahop::config::{DefaultConfig, ProtocolConfig};
use lorahop::debug::DebugEvent;
use lorahop::traits::{Clock, Random, Scheduler, Timer, TimerHandle, Transport};
use lorahop::{Duration, Event, Node, NodeId, NodeMetrics, NodeSettings, Timestamp, LORA_MTU};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Radio stand-in that records every broadcast until the simulator collects it.
pub struct SimTransport {
    mtu: usize,
    sent: Vec<Vec<u8>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            mtu: LORA_MTU,
            sent: Vec::new(),
        }
    }

    pub fn with_mtu(mtu: usize) -> Self {
        Self {
            mtu,
            sent: Vec::new(),
        }
    }

    /// Take all frames broadcast since the last call.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn broadcast(&mut self, frame: Vec<u8>) {
        self.sent.push(frame);
    }
}

/// Mock clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::at(Timestamp::ZERO)
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }

    pub fn advance(&self, duration: Duration) {
        self.current.set(self.current.get() + duration);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}

/// A timer the node asked for, relative to the time it asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub handle: TimerHandle,
    pub delay: Duration,
    pub timer: Timer,
}

/// Timer operations collected from one node callback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerOps {
    pub scheduled: Vec<TimerRequest>,
    pub cancelled: Vec<TimerHandle>,
}

impl TimerOps {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.cancelled.is_empty()
    }
}

/// Scheduler that queues requests for the simulator's event heap.
pub struct SimScheduler {
    next_handle: u64,
    ops: TimerOps,
}

impl SimScheduler {
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            ops: TimerOps::default(),
        }
    }

    /// Take every schedule and cancel request since the last call.
    pub fn drain(&mut self) -> TimerOps {
        std::mem::take(&mut self.ops)
    }
}

impl Default for SimScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for SimScheduler {
    fn schedule_after(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.ops.scheduled.push(TimerRequest {
            handle,
            delay,
            timer,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.ops.cancelled.push(handle);
    }
}

/// Seeded random source for simulation.
pub struct SimRandom {
    rng: StdRng,
}

impl SimRandom {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner<Cfg = DefaultConfig> = Node<SimTransport, SimClock, SimScheduler, SimRandom, Cfg>;

/// Wrapper around a lorahop Node for simulation.
pub struct SimNode<Cfg: ProtocolConfig = DefaultConfig> {
    inner: SimNodeInner<Cfg>,
}

impl<Cfg: ProtocolConfig> SimNode<Cfg> {
    /// Create a stopped node whose window jitter is drawn from `seed`.
    pub fn new(settings: NodeSettings, seed: u64) -> Self {
        let inner = Node::new(
            SimTransport::new(),
            SimClock::new(),
            SimScheduler::new(),
            SimRandom::with_seed(seed),
            settings,
        );
        Self { inner }
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id()
    }

    pub fn settings(&self) -> &NodeSettings {
        self.inner.settings()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn metrics(&self) -> &NodeMetrics {
        self.inner.metrics()
    }

    /// Get a reference to the inner node.
    pub fn inner(&self) -> &SimNodeInner<Cfg> {
        &self.inner
    }

    /// Get a mutable reference to the inner node.
    pub fn inner_mut(&mut self) -> &mut SimNodeInner<Cfg> {
        &mut self.inner
    }

    pub fn start(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.start();
    }

    pub fn stop(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.stop();
    }

    /// Deliver a frame from the radio.
    pub fn handle_rx(&mut self, data: &[u8], from: NodeId, now: Timestamp) {
        // Update the clock so any code that reads clock.now() gets correct time
        self.inner.clock().set(now);
        self.inner.handle_rx(data, Some(from));
    }

    /// Deliver a due timer.
    pub fn handle_timer(&mut self, timer: Timer, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(timer);
    }

    /// Take all frames broadcast since the last call.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        self.inner.transport_mut().take_sent()
    }

    /// Take timer requests made since the last call.
    pub fn take_timer_ops(&mut self) -> TimerOps {
        self.inner.scheduler_mut().drain()
    }

    /// Take all pending protocol events.
    pub fn take_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.events().try_receive() {
            events.push(event);
        }
        events
    }

    /// Take all debug events from the node's debug channel.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.debug_channel().try_receive() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simnode_starts_stopped() {
        let node: SimNode = SimNode::new(NodeSettings::repeater(4, 2), 1);
        assert_eq!(node.node_id(), 4);
        assert!(!node.is_running());
    }

    #[test]
    fn test_source_requests_send_timer() {
        let mut node: SimNode = SimNode::new(
            NodeSettings::source(0, 3).with_send_interval(Duration::from_secs(5)),
            1,
        );
        node.start(Timestamp::from_secs(1));

        let ops = node.take_timer_ops();
        assert_eq!(ops.scheduled.len(), 1);
        assert_eq!(ops.scheduled[0].timer, Timer::Send);
        assert_eq!(ops.scheduled[0].delay, Duration::from_secs(5));
        assert!(node.take_timer_ops().is_empty());
    }

    #[test]
    fn test_send_timer_broadcasts() {
        let mut node: SimNode = SimNode::new(NodeSettings::source(0, 3).with_payload_size(32), 1);
        node.start(Timestamp::ZERO);
        node.take_timer_ops();

        node.handle_timer(Timer::Send, Timestamp::from_secs(20));
        let sent = node.take_sent();
        assert_eq!(sent.len(), 1);
        // Fixed fields, path length, one path entry, then the payload.
        assert_eq!(sent[0].len(), 11 + 1 + 4 + 32);
        assert!(matches!(node.take_events().as_slice(), [Event::Originated { .. }]));
    }

    #[test]
    fn test_window_jitter_deterministic_per_seed() {
        let delays = |seed| {
            let mut node: SimNode = SimNode::new(NodeSettings::repeater(1, 2), seed);
            node.start(Timestamp::ZERO);
            let frame = lorahop::Frame::new(lorahop::RoutingHeader::originate(0, 0, 3), vec![]);
            let bytes = lorahop::Codec::encode_to_vec(&frame).unwrap();
            node.handle_rx(&bytes, 0, Timestamp::ZERO);
            node.take_timer_ops().scheduled[0].delay
        };

        assert_eq!(delays(7), delays(7));
        let d = delays(7);
        assert!(d >= DefaultConfig::MIN_WAIT && d <= DefaultConfig::MAX_WAIT);
    }

    #[test]
    fn test_sim_random_degenerate_range() {
        let mut rng = SimRandom::with_seed(3);
        assert_eq!(rng.gen_range(9, 9), 9);
        assert_eq!(rng.gen_range(9, 2), 9);
        let v = rng.gen_range(0, 10);
        assert!(v < 10);
    }

    #[test]
    fn test_stop_reports_cancellations() {
        let mut node: SimNode = SimNode::new(NodeSettings::source(0, 3), 1);
        node.start(Timestamp::ZERO);
        let handle = node.take_timer_ops().scheduled[0].handle;

        node.stop(Timestamp::from_secs(2));
        assert_eq!(node.take_timer_ops().cancelled, vec![handle]);
        assert!(node
            .take_debug_events()
            .contains(&DebugEvent::SendTimerCancelled));
    }
}
