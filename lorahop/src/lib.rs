#![forbid(unsafe_code)]
//! lorahop - contention-based hop-by-hop flooding for LoRa meshes
//!
//! Every node broadcasts. A node that overhears a packet for the first time
//! opens a short randomized listening window, collects every copy of that
//! logical packet relayed by its neighbours, and when the window closes relays
//! at most one of them toward the gateway. No routing tables, no per-link
//! acknowledgments.
//!
//! This crate is `no_std` but **requires the `alloc` crate**.
//!
//! # Key Properties
//!
//! - One relay decision per logical packet per node
//! - Spatial filter: only copies that did not retreat from the gateway are
//!   considered (`gateway_distance + RETREAT_FACTOR > own rank`)
//! - Among those, the fewest hops wins; ties go to the largest rank, first
//!   arrival first
//! - Copies at or past `MAX_HOPS` never open a window
//! - Gateways are pure sinks
//!
//! # Example
//!
//! ```
//! use lorahop::traits::test_impls::{MockClock, MockRandom, MockScheduler, MockTransport};
//! use lorahop::{Codec, DefaultConfig, Event, Frame, Node, NodeSettings, RoutingHeader};
//!
//! let mut node = Node::<_, _, _, _, DefaultConfig>::new(
//!     MockTransport::new(),
//!     MockClock::new(),
//!     MockScheduler::new(),
//!     MockRandom::new(),
//!     NodeSettings::repeater(1, 2),
//! );
//! node.start();
//!
//! // First copy from the source (rank 3) opens a window.
//! let frame = Frame::new(RoutingHeader::originate(0x0000_0000, 0, 3), vec![1, 2, 3]);
//! node.handle_rx(&frame.encode_to_vec().unwrap(), Some(0));
//!
//! // The scheduler fires the window timer.
//! let timer = node.scheduler_mut().pending()[0].timer;
//! node.handle_timer(timer);
//!
//! let sent = node.transport_mut().take_sent();
//! let relayed = Frame::decode_from_slice(&sent[0]).unwrap();
//! assert_eq!(relayed.header.hop_count, 2);
//! assert_eq!(relayed.header.path, vec![0, 1]);
//! assert!(matches!(node.events().try_receive(), Ok(Event::Forwarded { .. })));
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Identifiers, constants, errors and events
//! - [`wire`] - Routing header and frame codec
//! - [`cache`] - Duplicate-suppression cache
//! - [`policy`] - Window resolution policy
//! - [`node`] - Per-node state machine
//! - [`traits`] - Transport, Clock, Scheduler, Random traits
//! - [`airtime`] - LoRa time-on-air
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Protocol constants and node settings

#![no_std]

// Prevent mocks from leaking into release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It exposes in-memory mock collaborators intended only for tests."
);

extern crate alloc;

pub mod airtime;
pub mod cache;
pub mod config;
#[macro_use]
pub mod debug;
pub mod node;
pub mod policy;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use cache::{Candidate, DuplicateCache};
pub use config::{DefaultConfig, NodeSettings, ProtocolConfig, Sf12Config};
pub use node::Node;
pub use policy::{select_winner, Selection};
pub use time::{Duration, Timestamp};
pub use traits::{Clock, EventChannel, Random, Scheduler, Timer, TimerHandle, Transport};
pub use types::{
    make_logical_id, DiscardReason, Error, Event, LogicalId, NodeId, NodeMetrics, Payload,
};
pub use wire::{Codec, Frame, RoutingHeader};

// Re-export constants
pub use types::{LORA_MTU, MAX_PATH_LEN, PACKET_TYPE_DATA};

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::traits::test_impls::{MockClock, MockRandom, MockScheduler, MockTransport};

    type TestNode = Node<MockTransport, MockClock, MockScheduler, MockRandom, DefaultConfig>;

    fn node(settings: NodeSettings, seed: u64) -> TestNode {
        let mut n = Node::new(
            MockTransport::new(),
            MockClock::new(),
            MockScheduler::new(),
            MockRandom::with_seed(seed),
            settings,
        );
        n.start();
        n
    }

    /// Fire every pending window timer on `n`.
    fn flush_windows(n: &mut TestNode) {
        let timers: Vec<Timer> = n
            .scheduler()
            .pending()
            .iter()
            .map(|s| s.timer)
            .filter(|t| matches!(t, Timer::WindowClose { .. }))
            .collect();
        for t in timers {
            n.scheduler_mut().take(t);
            n.handle_timer(t);
        }
    }

    #[test]
    fn test_chain_by_hand() {
        // source(0, rank 3) -> relay(1, rank 2) -> relay(2, rank 1) -> gateway(3)
        let mut source = node(NodeSettings::source(0, 3).with_payload_size(8), 1);
        let mut r1 = node(NodeSettings::repeater(1, 2), 2);
        let mut r2 = node(NodeSettings::repeater(2, 1), 3);
        let mut gw = node(NodeSettings::gateway(3), 4);

        source.scheduler_mut().take(Timer::Send);
        source.handle_timer(Timer::Send);
        let f0 = source.transport_mut().take_sent().remove(0);

        r1.handle_rx(&f0, Some(0));
        flush_windows(&mut r1);
        let f1 = r1.transport_mut().take_sent().remove(0);

        // r2 hears r1; the source's echo at r1 is stale.
        r2.handle_rx(&f1, Some(1));
        r1.handle_rx(&f1, Some(1));
        source.handle_rx(&f1, Some(1));
        flush_windows(&mut r2);
        let f2 = r2.transport_mut().take_sent().remove(0);

        gw.handle_rx(&f2, Some(2));
        match gw.events().try_receive() {
            Ok(Event::GatewayReceived {
                logical_id,
                origin,
                hop_count,
                path,
                payload_len,
            }) => {
                assert_eq!(logical_id, make_logical_id(0, 0).unwrap());
                assert_eq!(origin, 0);
                assert_eq!(hop_count, 3);
                assert_eq!(path, vec![0, 1, 2]);
                assert_eq!(payload_len, 8);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(r1.metrics().stale_duplicates, 1);
        assert_eq!(source.metrics().stale_duplicates, 1);
        assert_eq!(r1.metrics().forwarded, 1);
        assert_eq!(r2.metrics().forwarded, 1);
    }

    #[test]
    fn test_relay_does_not_flow_backwards() {
        // A copy from a node closer to the gateway than retreat allows is dropped.
        let mut far = node(NodeSettings::repeater(7, 4), 9);
        let h = RoutingHeader::originate(make_logical_id(2, 0).unwrap(), 2, 1);
        far.handle_rx(&Frame::new(h, vec![]).encode_to_vec().unwrap(), Some(2));
        flush_windows(&mut far);

        assert_eq!(far.transport().sent_count(), 0);
        assert!(matches!(
            far.events().try_receive(),
            Ok(Event::Discarded {
                reason: DiscardReason::NoSpatialCandidate,
                ..
            })
        ));
    }
}
