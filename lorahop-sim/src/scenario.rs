//! Scenario builder for setting up and running simulations.

use lorahop::airtime::LoraParams;
use lorahop::config::{DefaultConfig, ProtocolConfig};
use lorahop::{Duration, NodeId, NodeSettings, Timestamp};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::Topology;

/// Simulated length of the reference deployment.
pub const PAPER_SIM_TIME: Duration = Duration::from_secs(3700);
/// Packets the reference source sends over [`PAPER_SIM_TIME`].
pub const PAPER_PACKET_COUNT: u64 = 184;
/// Application payload of the reference deployment, in bytes.
pub const PAPER_PAYLOAD_SIZE: usize = 32;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    /// Every node hears every other node.
    FullyConnected,
    /// Nodes in insertion order, each hearing only its neighbours.
    Chain,
    /// Custom topology provided by user.
    Custom(Topology),
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    nodes: Vec<NodeSettings>,
    /// RNG seed for determinism.
    seed: u64,
    topology_type: TopologyType,
    /// Global frame loss rate.
    loss_rate: f64,
    /// Extra per-link delay.
    delay: Duration,
    radio: LoraParams,
    start_at: Timestamp,
    stop_at: Option<Timestamp>,
    /// Scheduled actions.
    actions: Vec<(Timestamp, ScenarioAction)>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    /// An empty, fully connected scenario on SF7.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            seed: 42,
            topology_type: TopologyType::FullyConnected,
            loss_rate: 0.0,
            delay: Duration::ZERO,
            radio: LoraParams::sf7(),
            start_at: Timestamp::ZERO,
            stop_at: None,
            actions: Vec::new(),
        }
    }

    /// Add a node. Chain topologies link nodes in the order they are added.
    pub fn node(mut self, settings: NodeSettings) -> Self {
        self.nodes.push(settings);
        self
    }

    pub fn nodes(mut self, settings: impl IntoIterator<Item = NodeSettings>) -> Self {
        self.nodes.extend(settings);
        self
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set a custom network topology.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = TopologyType::Custom(topo);
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = TopologyType::FullyConnected;
        self
    }

    pub fn chain_topology(mut self) -> Self {
        self.topology_type = TopologyType::Chain;
        self
    }

    /// Set global frame loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set extra link delay on top of airtime.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_radio(mut self, radio: LoraParams) -> Self {
        self.radio = radio;
        self
    }

    /// When every node starts. Defaults to time zero.
    pub fn start_at(mut self, time: Timestamp) -> Self {
        self.start_at = time;
        self
    }

    /// When every node stops, discarding open windows.
    pub fn stop_at(mut self, time: Timestamp) -> Self {
        self.stop_at = Some(time);
        self
    }

    /// Schedule an arbitrary scenario action.
    pub fn action_at(mut self, time: Timestamp, action: ScenarioAction) -> Self {
        self.actions.push((time, action));
        self
    }

    /// Take the link between two nodes down at `time`.
    pub fn disable_link_at(self, time: Timestamp, a: NodeId, b: NodeId) -> Self {
        self.action_at(time, ScenarioAction::DisableLink { from: a, to: b })
    }

    /// Bring the link between two nodes back up at `time`.
    pub fn enable_link_at(self, time: Timestamp, a: NodeId, b: NodeId) -> Self {
        self.action_at(time, ScenarioAction::EnableLink { from: a, to: b })
    }

    /// Build with the default protocol constants.
    pub fn build(self) -> Simulator {
        self.build_with_config::<DefaultConfig>()
    }

    /// Build with custom protocol constants.
    pub fn build_with_config<Cfg: ProtocolConfig>(self) -> Simulator<Cfg> {
        let ids: Vec<NodeId> = self.nodes.iter().map(|s| s.node_id).collect();

        let mut topo = match self.topology_type {
            TopologyType::FullyConnected => Topology::fully_connected(&ids),
            TopologyType::Chain => Topology::chain(&ids),
            TopologyType::Custom(t) => t,
        };
        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        if self.delay > Duration::ZERO {
            topo.set_global_delay(self.delay);
        }

        let mut sim = Simulator::new(self.seed)
            .with_topology(topo)
            .with_radio(self.radio);

        for (i, settings) in self.nodes.into_iter().enumerate() {
            sim.add_node(settings, self.seed.wrapping_add(i as u64 * 1000));
        }

        for &node in &ids {
            sim.schedule_action(self.start_at, ScenarioAction::StartNode { node });
        }
        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }
        if let Some(stop) = self.stop_at {
            for &node in &ids {
                sim.schedule_action(stop, ScenarioAction::StopNode { node });
            }
        }

        sim
    }

    /// Build and run for a duration.
    pub fn run_for(self, duration: Duration) -> SimulationResult {
        self.build().run_for(duration)
    }

    /// Build and run until a specific time.
    pub fn run_until(self, end_time: Timestamp) -> SimulationResult {
        self.build().run_until(end_time)
    }
}

/// Placement of the reference four-node deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Line of sight: every node hears every other node.
    Unobstructed,
    /// Buildings in the way: each node hears only the next one along the chain.
    Obstructed,
}

/// The reference deployment: a source, two repeaters and a gateway.
///
/// | node | role     | rank |
/// |------|----------|------|
/// | 0    | source   | 4    |
/// | 1    | repeater | 3    |
/// | 2    | repeater | 2    |
/// | 3    | gateway  | 1    |
///
/// The source sends [`PAPER_PACKET_COUNT`] packets of
/// [`PAPER_PAYLOAD_SIZE`] bytes evenly over [`PAPER_SIM_TIME`]. Nodes start
/// at one second and stop one second before the end.
pub fn paper_scenario(deployment: Deployment) -> ScenarioBuilder {
    let interval =
        Duration::from_secs_f64(PAPER_SIM_TIME.as_secs_f64() / PAPER_PACKET_COUNT as f64);

    let builder = ScenarioBuilder::new()
        .node(
            NodeSettings::source(0, 4)
                .with_send_interval(interval)
                .with_payload_size(PAPER_PAYLOAD_SIZE),
        )
        .node(NodeSettings::repeater(1, 3))
        .node(NodeSettings::repeater(2, 2))
        .node(NodeSettings::gateway(3).with_gateway_distance(1))
        .start_at(Timestamp::from_secs(1))
        .stop_at(Timestamp::ZERO + PAPER_SIM_TIME.saturating_sub(Duration::from_secs(1)));

    match deployment {
        Deployment::Unobstructed => builder.fully_connected(),
        Deployment::Obstructed => builder.chain_topology(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_fully_connected() {
        let sim = ScenarioBuilder::new()
            .node(NodeSettings::repeater(1, 2))
            .node(NodeSettings::repeater(2, 2))
            .node(NodeSettings::gateway(3))
            .build();

        assert_eq!(sim.node_ids(), vec![1, 2, 3]);
        assert!(sim.topology().is_connected(1, 3));
        assert_eq!(sim.topology().link_count(), 3);
    }

    #[test]
    fn test_chain_follows_insertion_order() {
        let sim = ScenarioBuilder::new()
            .nodes([
                NodeSettings::repeater(9, 2),
                NodeSettings::repeater(4, 1),
                NodeSettings::gateway(7),
            ])
            .chain_topology()
            .build();

        assert_eq!(sim.topology().neighbors(4), vec![7, 9]);
        assert!(!sim.topology().is_connected(9, 7));
    }

    #[test]
    fn test_loss_and_delay_applied_to_links() {
        let sim = ScenarioBuilder::new()
            .node(NodeSettings::repeater(1, 2))
            .node(NodeSettings::gateway(2))
            .with_loss_rate(0.3)
            .with_delay(Duration::from_millis(5))
            .build();

        let link = sim.topology().get_link(1, 2).unwrap();
        assert_eq!(link.loss_rate, 0.3);
        assert_eq!(link.delay, Duration::from_millis(5));
    }

    #[test]
    fn test_nodes_start_at_configured_time() {
        let mut sim = ScenarioBuilder::new()
            .node(NodeSettings::repeater(1, 2))
            .start_at(Timestamp::from_secs(5))
            .build();

        sim.run_until(Timestamp::from_secs(4));
        assert!(!sim.node(1).unwrap().is_running());
        sim.run_until(Timestamp::from_secs(5));
        assert!(sim.node(1).unwrap().is_running());
    }

    #[test]
    fn test_paper_scenario_layout() {
        let sim = paper_scenario(Deployment::Obstructed).build();

        let source = sim.node(0).unwrap().settings();
        assert!(source.is_source);
        assert_eq!(source.gateway_distance, 4);
        assert_eq!(source.payload_size, PAPER_PAYLOAD_SIZE);
        assert_eq!(source.send_interval.as_millis() / 100, 201);

        assert_eq!(sim.node(1).unwrap().settings().gateway_distance, 3);
        assert_eq!(sim.node(2).unwrap().settings().gateway_distance, 2);
        assert!(sim.node(3).unwrap().settings().is_gateway);

        assert_eq!(sim.topology().neighbors(1), vec![0, 2]);
        assert!(!sim.topology().is_connected(0, 3));

        let open = paper_scenario(Deployment::Unobstructed).build();
        assert!(open.topology().is_connected(0, 3));
    }

    #[test]
    fn test_stop_at_stops_every_node() {
        let mut sim = ScenarioBuilder::new()
            .node(NodeSettings::source(0, 1))
            .node(NodeSettings::gateway(1))
            .stop_at(Timestamp::from_secs(50))
            .build();

        let result = sim.run_until(Timestamp::from_secs(200));
        assert_eq!(result.metrics.originated_count(), 2);
        assert!(!sim.node(0).unwrap().is_running());
        assert!(!sim.node(1).unwrap().is_running());
        assert!(result.queue_exhausted);
    }
}
