//! Discrete event simulator for lorahop networks.
//!
//! Every node is driven by callbacks from one event heap. After each callback
//! the simulator collects what the node produced: timer requests become
//! `TimerFire` events, broadcasts fan out to every active neighbour after the
//! frame's time on air, and protocol events are logged and folded into
//! [`SimMetrics`].
//!
//! The radio model is deliberately thin: no collisions, no half-duplex, no
//! capture effect. Loss comes only from per-link loss rates.

use std::collections::BinaryHeap;

use hashbrown::{HashMap, HashSet};
use lorahop::airtime::{time_on_air, LoraParams};
use lorahop::config::{DefaultConfig, ProtocolConfig};
use lorahop::{Duration, NodeId, NodeSettings, Timer, TimerHandle, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult};
use crate::node::SimNode;
use crate::topology::Topology;

/// Discrete event simulator for lorahop networks.
pub struct Simulator<Cfg: ProtocolConfig = DefaultConfig> {
    /// All nodes in the simulation.
    nodes: HashMap<NodeId, SimNode<Cfg>>,
    /// Network topology.
    topology: Topology,
    /// Radio parameters used for airtime.
    radio: LoraParams,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Timers cancelled after they were queued.
    cancelled: HashSet<(NodeId, TimerHandle)>,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// Link loss draws.
    rng: StdRng,
}

impl<Cfg: ProtocolConfig> Simulator<Cfg> {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            radio: LoraParams::sf7(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Set the network topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the radio parameters frames are timed with.
    pub fn with_radio(mut self, radio: LoraParams) -> Self {
        self.radio = radio;
        self
    }

    /// Add a stopped node. Start it with [`start_node`](Self::start_node) or a
    /// scheduled [`ScenarioAction::StartNode`].
    ///
    /// A node with the same id is replaced.
    pub fn add_node(&mut self, settings: NodeSettings, seed: u64) -> NodeId {
        let node = SimNode::new(settings, seed);
        let node_id = node.node_id();
        self.nodes.insert(node_id, node);
        node_id
    }

    /// Get a reference to a node.
    pub fn node(&self, id: NodeId) -> Option<&SimNode<Cfg>> {
        self.nodes.get(&id)
    }

    /// Get a mutable reference to a node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SimNode<Cfg>> {
        self.nodes.get_mut(&id)
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Get the current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Get the topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Get mutable topology.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn radio(&self) -> &LoraParams {
        &self.radio
    }

    /// Get collected metrics.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Events still queued.
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Start a node at the current time.
    pub fn start_node(&mut self, id: NodeId) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.start(now);
            debug!(node = id, "node started");
        }
        self.collect(id);
    }

    /// Stop a node at the current time. Its open windows are discarded.
    pub fn stop_node(&mut self, id: NodeId) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.stop(now);
            debug!(node = id, "node stopped");
        }
        self.collect(id);
    }

    /// Start every node at the current time, in id order.
    pub fn start_all(&mut self) {
        for id in self.node_ids() {
            self.start_node(id);
        }
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self.event_queue.peek().is_some_and(|e| e.time <= end_time) {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
        }

        // Advance to end_time even if no more events
        self.advance_time(end_time);
        self.result()
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until event queue is empty or max events processed.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        let mut processed = 0;

        while processed < max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            processed += 1;
        }

        self.result()
    }

    fn result(&self) -> SimulationResult {
        debug!(
            time = %self.current_time,
            originated = self.metrics.originated_count(),
            delivered = self.metrics.delivered_count(),
            "simulation paused"
        );
        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    /// Advance simulation time.
    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    /// Process a single event.
    fn process_event(&mut self, event: Event) {
        match event {
            Event::FrameDelivery { to, from, data } => self.deliver_frame(to, from, data),
            Event::TimerFire {
                node,
                handle,
                timer,
            } => self.fire_timer(node, handle, timer),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    /// Deliver a frame to a node.
    fn deliver_frame(&mut self, to: NodeId, from: NodeId, data: Vec<u8>) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&to) {
            // A stopped node's radio is off.
            if node.is_running() {
                self.metrics.frames_delivered += 1;
            }
            node.handle_rx(&data, from, now);
        }
        // Collect outputs (separate borrow)
        self.collect(to);
    }

    /// Fire a node timer unless it was cancelled.
    fn fire_timer(&mut self, node_id: NodeId, handle: TimerHandle, timer: Timer) {
        if self.cancelled.remove(&(node_id, handle)) {
            trace!(node = node_id, ?timer, "cancelled timer skipped");
            return;
        }

        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.handle_timer(timer, now);
        }
        self.collect(node_id);
    }

    /// Collect timers, broadcasts and events a node produced in its last callback.
    fn collect(&mut self, node_id: NodeId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        let ops = node.take_timer_ops();
        let frames = node.take_sent();
        let events = node.take_events();
        let debug_events = node.take_debug_events();

        for handle in ops.cancelled {
            self.cancelled.insert((node_id, handle));
        }
        for request in ops.scheduled {
            self.schedule(
                now + request.delay,
                Event::TimerFire {
                    node: node_id,
                    handle: request.handle,
                    timer: request.timer,
                },
            );
        }

        for event in debug_events {
            trace!(node = node_id, ?event, "debug");
        }
        for event in &events {
            info!(node = node_id, time = %now, ?event, "protocol event");
            self.metrics.record_event(node_id, event, now);
        }

        for frame in frames {
            self.broadcast(node_id, frame);
        }
    }

    /// Fan a frame out to every active neighbour after its time on air.
    fn broadcast(&mut self, sender: NodeId, data: Vec<u8>) {
        self.metrics.frames_sent += 1;
        let airtime = time_on_air(&self.radio, data.len());
        let now = self.current_time;

        // Collect link info first to avoid borrow conflicts
        let mut deliveries = Vec::new();
        for neighbor in self.topology.neighbors(sender) {
            let Some(link) = self.topology.get_link(sender, neighbor) else {
                continue;
            };
            let (loss_rate, delay) = (link.loss_rate, link.delay);

            if loss_rate > 0.0 && self.rng.gen::<f64>() < loss_rate {
                self.metrics.frames_lost += 1;
                trace!(from = sender, to = neighbor, "frame lost");
                continue;
            }
            deliveries.push((neighbor, delay));
        }

        for (neighbor, delay) in deliveries {
            self.schedule(
                now + airtime + delay,
                Event::FrameDelivery {
                    to: neighbor,
                    from: sender,
                    data: data.clone(),
                },
            );
        }
    }

    /// Execute a scenario action.
    fn execute_action(&mut self, action: ScenarioAction) {
        debug!(?action, time = %self.current_time, "scenario action");
        match action {
            ScenarioAction::StartNode { node } => self.start_node(node),
            ScenarioAction::StopNode { node } => self.stop_node(node),
            ScenarioAction::DisableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { from, to, rate } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
        }
    }
}
