//! Event types and priority queue for discrete event simulation.

use std::cmp::Ordering;

use lorahop::{NodeId, Timer, TimerHandle, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioAction {
    /// Enable reception and traffic on a node.
    StartNode { node: NodeId },
    /// Shut a node down, discarding its open windows.
    StopNode { node: NodeId },
    /// Disable a specific link.
    DisableLink { from: NodeId, to: NodeId },
    /// Enable a specific link.
    EnableLink { from: NodeId, to: NodeId },
    /// Set loss rate on a link.
    SetLossRate { from: NodeId, to: NodeId, rate: f64 },
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A broadcast frame finishes arriving at `to`.
    FrameDelivery {
        to: NodeId,
        from: NodeId,
        data: Vec<u8>,
    },
    /// A timer registered by `node` is due.
    TimerFire {
        node: NodeId,
        handle: TimerHandle,
        timer: Timer,
    },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Implement ordering for min-heap (BinaryHeap is max-heap, so we reverse).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earlier time first, then lower sequence number.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn timer_at(ms: u64, seq: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            Timestamp::from_millis(ms),
            SequenceNumber::new(seq),
            Event::TimerFire {
                node: 0,
                handle: TimerHandle(seq),
                timer: Timer::Send,
            },
        )
    }

    #[test]
    fn test_event_ordering() {
        let e1 = timer_at(10_000, 1);
        let e2 = timer_at(5_000, 2);

        // e2 has earlier time, so it should be "greater" in min-heap terms
        assert!(e2 > e1);
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        let e1 = timer_at(10_000, 1);
        let e2 = timer_at(10_000, 2);

        // Same time, e1 has lower sequence, so e1 should be processed first
        assert!(e1 > e2);
    }

    #[test]
    fn test_heap_pops_in_time_then_seq_order() {
        let mut heap = BinaryHeap::new();
        heap.push(timer_at(300, 0));
        heap.push(timer_at(100, 3));
        heap.push(timer_at(100, 1));
        heap.push(timer_at(200, 2));

        let order: Vec<(u64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.time.as_millis(), e.seq.value()))
            .collect();
        assert_eq!(order, vec![(100, 1), (100, 3), (200, 2), (300, 0)]);
    }
}
