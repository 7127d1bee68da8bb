//! Duplicate-suppression cache.
//!
//! Two tables keyed by logical id:
//!
//! - `seen`: window expiry for every logical id this node has handled. Entries
//!   outlive their window so late echoes are recognised as stale; the table is
//!   bounded and evicts the closed entry with the earliest expiry.
//! - `windows`: candidates collected while a window is open, removed exactly
//!   once when the window resolves.
//!
//! A logical id moves `Unseen -> Open -> Closed` and never goes back.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::time::Timestamp;
use crate::traits::TimerHandle;
use crate::types::{LogicalId, NodeId, Payload};
use crate::wire::RoutingHeader;

/// One received copy of a logical packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub header: RoutingHeader,
    pub payload: Payload,
    /// Link-layer sender, when the transport reports it.
    pub from: Option<NodeId>,
    pub received_at: Timestamp,
}

/// Where a logical id stands at this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Unseen,
    Open,
    Closed,
}

/// Result of offering a copy to the cache.
#[derive(Debug)]
pub enum Admission {
    /// Appended to the open window; total candidates so far.
    Buffered(usize),
    /// Window already closed; the copy was dropped.
    Stale,
    /// First copy of this logical id; handed back to the caller.
    Unseen(Candidate),
}

struct OpenWindow {
    handle: TimerHandle,
    candidates: Vec<Candidate>,
}

/// Per-node duplicate table.
pub struct DuplicateCache {
    seen: HashMap<LogicalId, Timestamp>,
    windows: HashMap<LogicalId, OpenWindow>,
    capacity: usize,
}

impl DuplicateCache {
    /// Cache remembering at most `capacity` logical ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashMap::new(),
            windows: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn state(&self, logical_id: LogicalId, now: Timestamp) -> WindowState {
        match self.seen.get(&logical_id) {
            None => WindowState::Unseen,
            Some(&expiry) if now <= expiry && self.windows.contains_key(&logical_id) => {
                WindowState::Open
            }
            Some(_) => WindowState::Closed,
        }
    }

    /// Offer a received copy.
    ///
    /// Open windows absorb it; closed ones drop it without touching any state.
    pub fn admit(&mut self, candidate: Candidate, now: Timestamp) -> Admission {
        let id = candidate.header.logical_id;
        match self.state(id, now) {
            WindowState::Unseen => Admission::Unseen(candidate),
            WindowState::Closed => Admission::Stale,
            WindowState::Open => match self.windows.get_mut(&id) {
                Some(window) => {
                    window.candidates.push(candidate);
                    Admission::Buffered(window.candidates.len())
                }
                None => Admission::Stale,
            },
        }
    }

    /// Ensure one more logical id fits, evicting if needed.
    ///
    /// Returns `false` when every remembered id still has an open window.
    pub fn make_room(&mut self) -> bool {
        if self.seen.len() < self.capacity {
            return true;
        }
        let victim = self
            .seen
            .iter()
            .filter(|(id, _)| !self.windows.contains_key(*id))
            .min_by_key(|(id, expiry)| (**expiry, **id))
            .map(|(id, _)| *id);
        match victim {
            Some(id) => {
                self.seen.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Open a window seeded with its first copy.
    ///
    /// Callers check [`make_room`](Self::make_room) first.
    pub fn open(&mut self, first: Candidate, expires_at: Timestamp, handle: TimerHandle) {
        let id = first.header.logical_id;
        self.seen.insert(id, expires_at);
        let mut candidates = Vec::with_capacity(2);
        candidates.push(first);
        self.windows.insert(id, OpenWindow { handle, candidates });
    }

    /// Record a logical id without opening a window.
    ///
    /// Copies arriving after `expires_at` are stale.
    pub fn remember(&mut self, logical_id: LogicalId, expires_at: Timestamp) -> bool {
        if !self.seen.contains_key(&logical_id) && !self.make_room() {
            return false;
        }
        self.seen.insert(logical_id, expires_at);
        true
    }

    /// Close a window and take its candidates, in arrival order.
    ///
    /// Returns `None` if no window is open for `logical_id`.
    pub fn close(&mut self, logical_id: LogicalId) -> Option<Vec<Candidate>> {
        self.windows.remove(&logical_id).map(|w| w.candidates)
    }

    /// Close every open window, returning ids and timer handles sorted by id.
    pub fn close_all(&mut self) -> Vec<(LogicalId, TimerHandle)> {
        let mut open: Vec<_> = self
            .windows
            .drain()
            .map(|(id, window)| (id, window.handle))
            .collect();
        open.sort_unstable_by_key(|(id, _)| *id);
        open
    }

    pub fn expiry(&self, logical_id: LogicalId) -> Option<Timestamp> {
        self.seen.get(&logical_id).copied()
    }

    /// Candidates collected so far for an open window.
    pub fn candidate_count(&self, logical_id: LogicalId) -> usize {
        self.windows
            .get(&logical_id)
            .map(|w| w.candidates.len())
            .unwrap_or(0)
    }

    pub fn is_open(&self, logical_id: LogicalId) -> bool {
        self.windows.contains_key(&logical_id)
    }

    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
