//! Protocol configuration.
//!
//! Two layers:
//!
//! - [`ProtocolConfig`]: compile-time constants shared by every node in a
//!   deployment (hop budget, retreat factor, window bounds, cache size).
//! - [`NodeSettings`]: per-node values injected at setup (id, gateway-distance
//!   rank, role, traffic cadence).
//!
//! # Window bounds
//!
//! The listening window is drawn uniformly from `[MIN_WAIT, MAX_WAIT]`.
//! `MIN_WAIT` approximates the time-on-air of a short frame at the
//! deployment's spreading factor and `MAX_WAIT` is three times that, so a
//! window spans at least one neighbour's retransmission.
//!
//! | Config | Radio | `MIN_WAIT` | `MAX_WAIT` |
//! |--------|-------|-----------:|-----------:|
//! | `DefaultConfig` | SF7 / 125 kHz | 61 ms | 183 ms |
//! | `Sf12Config` | SF12 / 125 kHz | 1155 ms | 3465 ms |
//!
//! `Sf12Config` is exactly the airtime of an 11-byte payload (see
//! [`time_on_air`](crate::airtime::time_on_air)); the SF7 values are the
//! ones used in the field deployment.
//!
//! # Example
//!
//! ```
//! use lorahop::{DefaultConfig, Duration, ProtocolConfig};
//!
//! struct FastConfig;
//! impl ProtocolConfig for FastConfig {
//!     const MIN_WAIT: Duration = Duration::from_millis(10);
//!     const MAX_WAIT: Duration = Duration::from_millis(30);
//! }
//!
//! assert_eq!(FastConfig::MAX_HOPS, DefaultConfig::MAX_HOPS);
//! ```

use crate::time::Duration;
use crate::types::NodeId;

/// Compile-time protocol constants.
///
/// Every constant has the default used in the field deployment; override only
/// what differs. `MIN_WAIT` must not exceed `MAX_WAIT` and `MAX_SEEN` must be
/// non-zero.
pub trait ProtocolConfig {
    /// First-seen copies at or above this hop count are dropped.
    const MAX_HOPS: u8 = 10;

    /// Tolerance of the spatial filter: a candidate passes when
    /// `gateway_distance + RETREAT_FACTOR > own gateway_distance`.
    const RETREAT_FACTOR: u8 = 1;

    /// Shortest listening window.
    const MIN_WAIT: Duration = Duration::from_millis(61);

    /// Longest listening window.
    const MAX_WAIT: Duration = Duration::from_millis(183);

    /// Logical ids remembered by the duplicate cache.
    const MAX_SEEN: usize = 256;
}

/// SF7 deployment defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl ProtocolConfig for DefaultConfig {}

/// Slowest spreading factor (SF12, 125 kHz, CR 4/5).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sf12Config;

impl ProtocolConfig for Sf12Config {
    const MIN_WAIT: Duration = Duration::from_millis(1155);
    const MAX_WAIT: Duration = Duration::from_millis(3465);
}

/// Per-node settings injected at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub node_id: NodeId,
    /// Configured hop-distance-to-gateway rank; smaller is closer.
    pub gateway_distance: u8,
    /// Gateways consume every copy and never relay.
    pub is_gateway: bool,
    /// Sources originate a packet every `send_interval`.
    pub is_source: bool,
    pub send_interval: Duration,
    /// Application payload size of originated packets, in bytes.
    pub payload_size: usize,
}

impl NodeSettings {
    /// A plain relay.
    pub fn repeater(node_id: NodeId, gateway_distance: u8) -> Self {
        Self {
            node_id,
            gateway_distance,
            is_gateway: false,
            is_source: false,
            send_interval: Duration::from_secs(20),
            payload_size: 20,
        }
    }

    /// A gateway sink. Its rank is zero.
    pub fn gateway(node_id: NodeId) -> Self {
        Self {
            is_gateway: true,
            ..Self::repeater(node_id, 0)
        }
    }

    /// A traffic source that also relays.
    pub fn source(node_id: NodeId, gateway_distance: u8) -> Self {
        Self {
            is_source: true,
            ..Self::repeater(node_id, gateway_distance)
        }
    }

    pub fn with_gateway_distance(mut self, gateway_distance: u8) -> Self {
        self.gateway_distance = gateway_distance;
        self
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }
}
