//! Metrics collection for simulation analysis.

use hashbrown::{HashMap, HashSet};
use lorahop::{DiscardReason, Duration, Event, LogicalId, NodeId, Timestamp};

/// One copy of a packet reaching a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayArrival {
    pub logical_id: LogicalId,
    pub origin: NodeId,
    pub gateway: NodeId,
    pub time: Timestamp,
    pub hop_count: u8,
    pub path: Vec<NodeId>,
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Broadcasts handed to the radio.
    pub frames_sent: u64,
    /// Per-receiver deliveries that reached a running node.
    pub frames_delivered: u64,
    /// Per-receiver deliveries dropped by link loss.
    pub frames_lost: u64,
    /// Origination time of every logical id.
    pub originated: HashMap<LogicalId, Timestamp>,
    /// Every gateway arrival, duplicates included, in arrival order.
    pub arrivals: Vec<GatewayArrival>,
    /// Relay decisions that produced a re-broadcast.
    pub forwarded: u64,
    pub discards: HashMap<DiscardReason, u64>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one node event into the totals.
    pub fn record_event(&mut self, node: NodeId, event: &Event, now: Timestamp) {
        match event {
            Event::Originated { logical_id, .. } => {
                self.originated.entry(*logical_id).or_insert(now);
            }
            Event::GatewayReceived {
                logical_id,
                origin,
                hop_count,
                path,
                ..
            } => self.arrivals.push(GatewayArrival {
                logical_id: *logical_id,
                origin: *origin,
                gateway: node,
                time: now,
                hop_count: *hop_count,
                path: path.clone(),
            }),
            Event::Forwarded { .. } => self.forwarded += 1,
            Event::Discarded { reason, .. } => *self.discards.entry(*reason).or_insert(0) += 1,
        }
    }

    pub fn originated_count(&self) -> usize {
        self.originated.len()
    }

    /// Distinct logical ids that reached any gateway.
    pub fn delivered_count(&self) -> usize {
        self.arrivals
            .iter()
            .map(|a| a.logical_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Packet delivery ratio. Zero when nothing was originated.
    pub fn pdr(&self) -> f64 {
        if self.originated.is_empty() {
            return 0.0;
        }
        let delivered = self
            .arrivals
            .iter()
            .filter(|a| self.originated.contains_key(&a.logical_id))
            .map(|a| a.logical_id)
            .collect::<HashSet<_>>()
            .len();
        delivered as f64 / self.originated.len() as f64
    }

    /// Gateway arrivals beyond the first per logical id.
    pub fn duplicate_arrivals(&self) -> usize {
        self.arrivals.len() - self.delivered_count()
    }

    /// The first arrival of each logical id, in arrival order.
    pub fn first_arrivals(&self) -> Vec<&GatewayArrival> {
        let mut seen = HashSet::new();
        self.arrivals
            .iter()
            .filter(|a| seen.insert(a.logical_id))
            .collect()
    }

    /// Mean origination-to-first-arrival time.
    pub fn mean_latency(&self) -> Option<Duration> {
        let latencies: Vec<u64> = self
            .first_arrivals()
            .into_iter()
            .filter_map(|a| {
                self.originated
                    .get(&a.logical_id)
                    .map(|&sent| a.time.saturating_since(sent).as_millis())
            })
            .collect();
        if latencies.is_empty() {
            return None;
        }
        let total: u64 = latencies.iter().sum();
        Some(Duration::from_millis(total / latencies.len() as u64))
    }

    /// Mean hop count over first arrivals.
    pub fn mean_hops(&self) -> Option<f64> {
        let first = self.first_arrivals();
        if first.is_empty() {
            return None;
        }
        let total: u64 = first.iter().map(|a| a.hop_count as u64).sum();
        Some(total as f64 / first.len() as f64)
    }

    pub fn discards_for(&self, reason: DiscardReason) -> u64 {
        self.discards.get(&reason).copied().unwrap_or(0)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    pub fn pdr(&self) -> f64 {
        self.metrics.pdr()
    }

    pub fn duplicate_arrivals(&self) -> usize {
        self.metrics.duplicate_arrivals()
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        self.metrics.mean_latency()
    }

    pub fn mean_hops(&self) -> Option<f64> {
        self.metrics.mean_hops()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(logical_id: LogicalId, hop_count: u8) -> Event {
        Event::GatewayReceived {
            logical_id,
            origin: 0,
            hop_count,
            path: (0..hop_count as NodeId).collect(),
            payload_len: 4,
        }
    }

    fn originated(logical_id: LogicalId) -> Event {
        Event::Originated {
            logical_id,
            payload_len: 4,
        }
    }

    #[test]
    fn test_empty_metrics() {
        let m = SimMetrics::new();
        assert_eq!(m.pdr(), 0.0);
        assert_eq!(m.duplicate_arrivals(), 0);
        assert_eq!(m.mean_latency(), None);
        assert_eq!(m.mean_hops(), None);
    }

    #[test]
    fn test_pdr_and_duplicates() {
        let mut m = SimMetrics::new();
        for id in 0..4 {
            m.record_event(0, &originated(id), Timestamp::from_secs(id as u64));
        }
        m.record_event(9, &arrival(0, 3), Timestamp::from_millis(500));
        m.record_event(9, &arrival(0, 1), Timestamp::from_millis(700));
        m.record_event(9, &arrival(2, 1), Timestamp::from_millis(2_100));

        assert_eq!(m.originated_count(), 4);
        assert_eq!(m.delivered_count(), 2);
        assert_eq!(m.pdr(), 0.5);
        assert_eq!(m.duplicate_arrivals(), 1);
    }

    #[test]
    fn test_latency_and_hops_use_first_arrival() {
        let mut m = SimMetrics::new();
        m.record_event(0, &originated(7), Timestamp::from_secs(10));
        m.record_event(0, &originated(8), Timestamp::from_secs(20));
        m.record_event(3, &arrival(7, 3), Timestamp::from_millis(10_300));
        m.record_event(3, &arrival(7, 1), Timestamp::from_millis(10_900));
        m.record_event(3, &arrival(8, 1), Timestamp::from_millis(20_100));

        let first = m.first_arrivals();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].hop_count, 3);
        assert_eq!(first[0].gateway, 3);

        assert_eq!(m.mean_latency(), Some(Duration::from_millis(200)));
        assert_eq!(m.mean_hops(), Some(2.0));
    }

    #[test]
    fn test_discards_by_reason() {
        let mut m = SimMetrics::new();
        let discard = |reason| Event::Discarded {
            logical_id: 1,
            reason,
        };
        m.record_event(1, &discard(DiscardReason::NoSpatialCandidate), Timestamp::ZERO);
        m.record_event(2, &discard(DiscardReason::NoSpatialCandidate), Timestamp::ZERO);
        m.record_event(2, &discard(DiscardReason::Shutdown), Timestamp::ZERO);
        m.record_event(
            2,
            &Event::Forwarded {
                logical_id: 1,
                hop_count: 2,
                candidates: 1,
            },
            Timestamp::ZERO,
        );

        assert_eq!(m.discards_for(DiscardReason::NoSpatialCandidate), 2);
        assert_eq!(m.discards_for(DiscardReason::Shutdown), 1);
        assert_eq!(m.discards_for(DiscardReason::CacheFull), 0);
        assert_eq!(m.forwarded, 1);
    }

    #[test]
    fn test_arrival_of_unknown_id_not_counted_in_pdr() {
        let mut m = SimMetrics::new();
        m.record_event(0, &originated(1), Timestamp::ZERO);
        m.record_event(3, &arrival(99, 1), Timestamp::from_secs(1));
        assert_eq!(m.pdr(), 0.0);
        assert_eq!(m.mean_latency(), None);
    }
}
