//! Debug events for protocol tracing.
//!
//! Compiled in with the `debug` feature (always in unit tests). Events go to a
//! bounded channel on the node; the simulator drains and logs them.

use embassy_sync::channel::Channel;

use crate::time::{Duration, Timestamp};
use crate::traits::ChannelMutex;
use crate::types::{Error, LogicalId, NodeId};

/// Queue size for the debug channel. Overflow drops the newest event.
pub(crate) const DEBUG_QUEUE_SIZE: usize = 64;

/// Debug event channel.
pub type DebugChannel = Channel<ChannelMutex, DebugEvent, DEBUG_QUEUE_SIZE>;

/// Fine-grained events emitted by the node for protocol tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// Received frame did not decode.
    DecodeFailed { data_len: usize, error: Error },
    /// First copy of a logical id opened a listening window.
    WindowOpened {
        logical_id: LogicalId,
        hop_count: u8,
        wait: Duration,
        expires_at: Timestamp,
    },
    /// Copy appended to an open window.
    CandidateBuffered {
        logical_id: LogicalId,
        from: Option<NodeId>,
        candidates: usize,
    },
    /// Copy arrived after its window closed.
    StaleDuplicate {
        logical_id: LogicalId,
        from: Option<NodeId>,
    },
    /// Window closed and the policy ran.
    WindowResolved {
        logical_id: LogicalId,
        candidates: usize,
        /// Index of the relayed copy, if any.
        winner: Option<usize>,
    },
    /// Timer delivered for a window that is no longer open.
    LateTimer { logical_id: LogicalId },
    /// Scheduled send abandoned.
    SendFailed { error: Error },
    /// `stop()` cancelled the periodic send.
    SendTimerCancelled,
}

#[cfg(any(test, feature = "debug"))]
macro_rules! emit_debug {
    ($node:expr, $event:expr) => {
        $node.record_debug($event)
    };
}

#[cfg(not(any(test, feature = "debug")))]
macro_rules! emit_debug {
    ($node:expr, $event:expr) => {{}};
}
