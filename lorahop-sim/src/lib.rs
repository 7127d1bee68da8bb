//! lorahop-sim - Discrete event simulator for lorahop relay networks.
//!
//! Runs any number of lorahop nodes in one process against simulated time,
//! deterministically for a given seed.
//!
//! # Features
//!
//! - **Discrete event simulation**: No real-time delays, deterministic ordering
//! - **Airtime-accurate delivery**: Frames arrive after their LoRa time on air
//! - **Configurable topology**: Fully connected, chain, or custom links with
//!   loss and extra delay
//! - **Scenario builder**: Node roles, start/stop times, scheduled link changes
//! - **Metrics collection**: Delivery ratio, duplicate arrivals, latency, hops
//!
//! # Example
//!
//! ```
//! use lorahop_sim::{paper_scenario, Deployment, Timestamp};
//!
//! let result = paper_scenario(Deployment::Obstructed).run_until(Timestamp::from_secs(120));
//!
//! // Every packet travels source -> repeater -> repeater -> gateway.
//! assert_eq!(result.pdr(), 1.0);
//! assert!(result.metrics.arrivals.iter().all(|a| a.path == vec![0, 1, 2]));
//! ```
//!
//! # Architecture
//!
//! The simulator uses a priority queue of events ordered by (time, sequence_number).
//! The main loop:
//! 1. Pop next event from queue
//! 2. Advance simulation time
//! 3. Call the node's `handle_rx` or `handle_timer`
//! 4. Collect timer requests, broadcasts and protocol events
//! 5. Route broadcasts through the topology and schedule deliveries
//!
//! Protocol events are logged with `tracing`; install a subscriber to see them.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use lorahop::{Duration, NodeId, NodeSettings, Timestamp};
pub use metrics::{GatewayArrival, SimMetrics, SimulationResult};
pub use node::SimNode;
pub use scenario::{paper_scenario, Deployment, ScenarioBuilder};
pub use sim::Simulator;
pub use topology::{Link, Topology};

#[cfg(test)]
mod tests {
    use lorahop::airtime::{time_on_air, LoraParams};
    use lorahop::{DiscardReason, Sf12Config};

    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_obstructed_full_run() {
        init_tracing();
        let result = paper_scenario(Deployment::Obstructed).run_until(Timestamp::from_secs(3705));

        // Sends at 1s + k * interval until the 3699s stop.
        assert_eq!(result.metrics.originated_count(), 183);
        assert_eq!(result.pdr(), 1.0);
        assert_eq!(result.duplicate_arrivals(), 0);
        assert!(result
            .metrics
            .arrivals
            .iter()
            .all(|a| a.hop_count == 3 && a.path == vec![0, 1, 2] && a.gateway == 3));
        assert_eq!(result.mean_hops(), Some(3.0));
        assert!(result.queue_exhausted);
    }

    #[test]
    fn test_unobstructed_direct_delivery_with_duplicates() {
        init_tracing();
        let result = paper_scenario(Deployment::Unobstructed).run_until(Timestamp::from_secs(200));

        let originated = result.metrics.originated_count();
        assert_eq!(originated, 9);
        assert_eq!(result.pdr(), 1.0);
        // The gateway hears the source directly.
        assert!(result.metrics.first_arrivals().iter().all(|a| a.hop_count == 1));
        // Both repeaters relay once per packet.
        assert_eq!(result.duplicate_arrivals(), 2 * originated);
        assert_eq!(result.metrics.forwarded, 2 * originated as u64);
    }

    #[test]
    fn test_unobstructed_relays_prefer_fewest_hops() {
        let result = paper_scenario(Deployment::Unobstructed).run_until(Timestamp::from_secs(100));

        for arrival in result.metrics.arrivals.iter().filter(|a| a.hop_count > 1) {
            assert_eq!(arrival.hop_count, 2);
            assert!(arrival.path == vec![0, 1] || arrival.path == vec![0, 2]);
        }
    }

    #[test]
    fn test_latency_bounded_by_windows_and_airtime() {
        let result = paper_scenario(Deployment::Obstructed).run_until(Timestamp::from_secs(200));

        // Three airtimes (the frame grows by one path entry per hop) plus two windows.
        let radio = LoraParams::sf7();
        let airtime = time_on_air(&radio, 48) + time_on_air(&radio, 52) + time_on_air(&radio, 56);
        let latency = result.mean_latency().unwrap();
        assert!(latency >= airtime + Duration::from_millis(2 * 61));
        assert!(latency <= airtime + Duration::from_millis(2 * 183));
    }

    #[test]
    fn test_broken_last_hop_delivers_nothing() {
        let mut sim = paper_scenario(Deployment::Obstructed).build();
        sim.topology_mut().get_link_mut(2, 3).unwrap().loss_rate = 1.0;

        let result = sim.run_until(Timestamp::from_secs(200));
        assert_eq!(result.metrics.originated_count(), 9);
        assert_eq!(result.pdr(), 0.0);
        assert_eq!(result.metrics.frames_lost, 9);
        assert_eq!(sim.node(2).unwrap().metrics().forwarded, 9);
    }

    #[test]
    fn test_link_outage_window() {
        let result = paper_scenario(Deployment::Obstructed)
            .disable_link_at(Timestamp::from_secs(50), 1, 2)
            .enable_link_at(Timestamp::from_secs(100), 1, 2)
            .run_until(Timestamp::from_secs(200));

        // Sends at ~61.3s and ~81.4s fall inside the outage.
        assert_eq!(result.metrics.originated_count(), 9);
        assert_eq!(result.metrics.delivered_count(), 7);
    }

    #[test]
    fn test_retreating_copy_discarded() {
        // Repeater 2 sits farther from the gateway than the source, so it
        // drops the copy instead of relaying it away.
        let result = ScenarioBuilder::new()
            .node(NodeSettings::source(0, 2))
            .node(NodeSettings::repeater(1, 1))
            .node(NodeSettings::repeater(2, 5))
            .node(NodeSettings::gateway(3))
            .topology({
                let mut t = Topology::chain(&[0, 1, 3]);
                t.add_link(0, 2, Link::new());
                t
            })
            .run_until(Timestamp::from_secs(30));

        assert_eq!(result.pdr(), 1.0);
        assert_eq!(result.metrics.discards_for(DiscardReason::NoSpatialCandidate), 1);
    }

    #[test]
    fn test_sf12_chain() {
        let mut sim = paper_scenario(Deployment::Obstructed)
            .with_radio(LoraParams::sf12())
            .build_with_config::<Sf12Config>();

        let result = sim.run_until(Timestamp::from_secs(200));
        assert_eq!(result.metrics.originated_count(), 9);
        assert_eq!(result.pdr(), 1.0);
        assert!(result.metrics.arrivals.iter().all(|a| a.hop_count == 3));
        // Two SF12 windows dominate the latency.
        assert!(result.mean_latency().unwrap() > Duration::from_millis(2 * 1155));
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let run = || {
            paper_scenario(Deployment::Unobstructed)
                .with_seed(7)
                .with_loss_rate(0.2)
                .run_until(Timestamp::from_secs(400))
        };
        let a = run();
        let b = run();

        assert_eq!(a.metrics.arrivals, b.metrics.arrivals);
        assert_eq!(a.metrics.frames_lost, b.metrics.frames_lost);
    }
}
