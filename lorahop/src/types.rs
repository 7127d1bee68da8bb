//! Core types, constants, errors and protocol events.

use alloc::vec::Vec;
use core::fmt;

/// Protocol-level node address.
pub type NodeId = u32;

/// Identity of one logical packet across all of its relayed copies.
pub type LogicalId = u32;

/// Opaque application payload carried after the routing header.
pub type Payload = Vec<u8>;

// Wire layout
pub const HEADER_FIXED_LEN: usize = 11; // lfid(4) + lnid(4) + lpty(1) + lh(1) + lgw(1)
pub const PATH_LEN_FIELD: usize = 1;
pub const PATH_ENTRY_LEN: usize = 4;
pub const MAX_PATH_LEN: usize = u8::MAX as usize;

// Packet types (only data is defined)
pub const PACKET_TYPE_DATA: u8 = 1;

// Logical id layout: node id in the high half, send counter in the low half.
pub const LOGICAL_ID_SEQ_BITS: u32 = 16;
pub const MAX_ORIGIN_ID: NodeId = 0xFFFF;
pub const MAX_SEQUENCE: u32 = 0xFFFF;

/// Largest LoRa PHY payload.
pub const LORA_MTU: usize = 255;

/// Error type for codec and origination operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Buffer holds fewer bytes than the header requires.
    #[error("truncated header")]
    Truncated,
    /// Path has more entries than the one-byte count can express.
    #[error("path exceeds 255 entries")]
    PathOverflow,
    /// Node id or send counter does not fit its 16-bit half of a logical id.
    #[error("logical id space exhausted")]
    IdSpaceExhausted,
    /// Encoded frame is larger than the transport MTU.
    #[error("frame exceeds transport MTU")]
    FrameTooLarge,
}

/// Build the logical id for the `counter`-th packet originated by `node_id`.
///
/// Both halves must fit in 16 bits; values that would collide with another
/// node's id space are rejected instead of wrapping.
pub fn make_logical_id(node_id: NodeId, counter: u32) -> Result<LogicalId, Error> {
    if node_id > MAX_ORIGIN_ID || counter > MAX_SEQUENCE {
        return Err(Error::IdSpaceExhausted);
    }
    Ok((node_id << LOGICAL_ID_SEQ_BITS) | counter)
}

/// Why a node resolved a logical packet without forwarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// First copy arrived with `hop_count >= MAX_HOPS`.
    MaxHopsExceeded,
    /// No candidate passed the spatial filter.
    NoSpatialCandidate,
    /// Several fewest-hop candidates, none with a positive rank.
    FilteredOut,
    /// Appending this node would overflow the path list.
    PathOverflow,
    /// Forwarded frame would not fit the transport MTU.
    FrameTooLarge,
    /// Duplicate cache full of open windows.
    CacheFull,
    /// Node stopped while the window was open.
    Shutdown,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscardReason::MaxHopsExceeded => "max hops exceeded",
            DiscardReason::NoSpatialCandidate => "no candidate satisfied spatial constraint",
            DiscardReason::FilteredOut => "discarded after filtering",
            DiscardReason::PathOverflow => "path overflow",
            DiscardReason::FrameTooLarge => "frame too large",
            DiscardReason::CacheFull => "duplicate cache full",
            DiscardReason::Shutdown => "node stopped",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of a logical packet at one node.
///
/// Exactly one event is produced per logical packet per node, except at a
/// gateway, which reports every copy it receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// This node generated and broadcast a new packet.
    Originated { logical_id: LogicalId, payload_len: usize },
    /// A copy reached this gateway.
    GatewayReceived {
        logical_id: LogicalId,
        origin: NodeId,
        hop_count: u8,
        path: Vec<NodeId>,
        payload_len: usize,
    },
    /// The window closed and the winning copy was re-broadcast.
    Forwarded {
        logical_id: LogicalId,
        /// Hop count carried by the re-broadcast copy.
        hop_count: u8,
        /// Copies collected during the window.
        candidates: usize,
    },
    /// The packet was dropped at this node.
    Discarded {
        logical_id: LogicalId,
        reason: DiscardReason,
    },
}

impl Event {
    pub fn logical_id(&self) -> LogicalId {
        match self {
            Event::Originated { logical_id, .. }
            | Event::GatewayReceived { logical_id, .. }
            | Event::Forwarded { logical_id, .. }
            | Event::Discarded { logical_id, .. } => *logical_id,
        }
    }
}

/// Per-node counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    /// Frames handed to the reception handler while running.
    pub frames_received: u64,
    /// Frames dropped because the header did not decode.
    pub decode_failures: u64,
    /// Copies that arrived after their window closed.
    pub stale_duplicates: u64,
    /// Copies appended to an already open window.
    pub buffered_duplicates: u64,
    pub windows_opened: u64,
    pub originated: u64,
    pub forwarded: u64,
    pub discarded: u64,
    pub gateway_received: u64,
    /// Scheduled sends abandoned (id space exhausted or frame too large).
    pub send_failures: u64,
    /// Originations whose own id could not be recorded because the duplicate
    /// cache was full of open windows. Echoes of such a packet open a window.
    pub unrecorded_originations: u64,
    /// Events lost because the event channel was full.
    pub events_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_logical_id() {
        assert_eq!(make_logical_id(0, 0), Ok(0));
        assert_eq!(make_logical_id(3, 7), Ok(0x0003_0007));
        assert_eq!(make_logical_id(0xFFFF, 0xFFFF), Ok(0xFFFF_FFFF));
    }

    #[test]
    fn test_make_logical_id_rejects_overflow() {
        assert_eq!(make_logical_id(0x1_0000, 0), Err(Error::IdSpaceExhausted));
        assert_eq!(make_logical_id(1, 0x1_0000), Err(Error::IdSpaceExhausted));
    }

    #[test]
    fn test_event_logical_id() {
        let e = Event::Discarded {
            logical_id: 42,
            reason: DiscardReason::MaxHopsExceeded,
        };
        assert_eq!(e.logical_id(), 42);
    }

    #[test]
    fn test_discard_reason_display() {
        assert_eq!(
            alloc::format!("{}", DiscardReason::NoSpatialCandidate),
            "no candidate satisfied spatial constraint"
        );
    }
}
