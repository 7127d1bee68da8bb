//! Node implementation - the per-node forwarding state machine.
//!
//! A node is driven entirely by its environment through three entry points,
//! never concurrently:
//! - [`Node::handle_rx`] for every frame the radio delivers
//! - [`Node::handle_timer`] when a [`Timer`] it registered fires
//! - [`Node::start`] / [`Node::stop`] for lifecycle
//!
//! Terminal outcomes are pushed onto [`Node::events`].
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::<_, _, _, _, DefaultConfig>::new(
//!     radio, rtc, timers, rng, NodeSettings::repeater(7, 2),
//! );
//! node.start();
//!
//! // radio interrupt / simulator delivery
//! node.handle_rx(&frame, Some(sender));
//!
//! // timer expiry
//! node.handle_timer(timer);
//!
//! while let Ok(event) = node.events().try_receive() {
//!     log(event);
//! }
//! ```

use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

use embassy_sync::channel::Channel;

use crate::cache::{Admission, Candidate, DuplicateCache};
use crate::config::{DefaultConfig, NodeSettings, ProtocolConfig};
use crate::policy::{select_winner, Selection};
use crate::time::Timestamp;
use crate::traits::{Clock, EventChannel, Random, Scheduler, Timer, TimerHandle, Transport};
use crate::types::{make_logical_id, DiscardReason, Event, LogicalId, NodeId, NodeMetrics};
use crate::wire::{Codec, Frame, RoutingHeader};

#[cfg(any(test, feature = "debug"))]
use crate::debug::{DebugChannel, DebugEvent};

/// A forwarding node.
///
/// Generic over its collaborators so the same state machine runs against
/// hardware drivers, the simulator and the unit-test mocks.
pub struct Node<T, Clk, S, R, Cfg = DefaultConfig>
where
    T: Transport,
    Clk: Clock,
    S: Scheduler,
    R: Random,
    Cfg: ProtocolConfig,
{
    // Collaborators
    transport: T,
    clock: Clk,
    scheduler: S,
    random: R,

    settings: NodeSettings,
    cache: DuplicateCache,

    // Channels
    events: EventChannel,
    #[cfg(any(test, feature = "debug"))]
    debug_channel: DebugChannel,

    // Lifecycle
    running: bool,
    send_timer: Option<TimerHandle>,
    send_counter: u32,
    ids_exhausted: bool,

    metrics: NodeMetrics,
    _config: PhantomData<Cfg>,
}

impl<T, Clk, S, R, Cfg> Node<T, Clk, S, R, Cfg>
where
    T: Transport,
    Clk: Clock,
    S: Scheduler,
    R: Random,
    Cfg: ProtocolConfig,
{
    /// Create a stopped node. Call [`start`](Self::start) to begin.
    pub fn new(transport: T, clock: Clk, scheduler: S, random: R, settings: NodeSettings) -> Self {
        Self {
            transport,
            clock,
            scheduler,
            random,

            settings,
            cache: DuplicateCache::new(Cfg::MAX_SEEN),

            events: Channel::new(),
            #[cfg(any(test, feature = "debug"))]
            debug_channel: Channel::new(),

            running: false,
            send_timer: None,
            send_counter: 0,
            ids_exhausted: false,

            metrics: NodeMetrics::default(),
            _config: PhantomData,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.settings.node_id
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Terminal-outcome channel. Drain it after each callback.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    #[cfg(any(test, feature = "debug"))]
    pub fn debug_channel(&self) -> &DebugChannel {
        &self.debug_channel
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &DuplicateCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // --- Lifecycle ---

    /// Enable reception and, on sources, arm the periodic send.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.arm_send_timer_if_live();
    }

    /// Cancel the send timer and every open window.
    ///
    /// Open windows resolve as [`DiscardReason::Shutdown`]. Reception and any
    /// timer delivered afterwards are ignored.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        if let Some(handle) = self.send_timer.take() {
            self.scheduler.cancel(handle);
            emit_debug!(self, crate::debug::DebugEvent::SendTimerCancelled);
        }

        for (logical_id, handle) in self.cache.close_all() {
            self.scheduler.cancel(handle);
            self.discard(logical_id, DiscardReason::Shutdown);
        }
    }

    // --- Reception ---

    /// Handle a frame delivered by the radio.
    ///
    /// `from` is the link-layer sender when the transport knows it.
    #[cfg_attr(not(any(test, feature = "debug")), allow(unused_variables))]
    pub fn handle_rx(&mut self, data: &[u8], from: Option<NodeId>) {
        if !self.running {
            return;
        }
        self.metrics.frames_received += 1;
        let now = self.clock.now();

        let frame = match Frame::decode_from_slice(data) {
            Ok(f) => f,
            Err(_error) => {
                self.metrics.decode_failures += 1;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::DecodeFailed {
                        data_len: data.len(),
                        error: _error,
                    }
                );
                return;
            }
        };

        if self.settings.is_gateway {
            self.consume_at_gateway(frame);
            return;
        }

        let candidate = Candidate {
            header: frame.header,
            payload: frame.payload,
            from,
            received_at: now,
        };
        let logical_id = candidate.header.logical_id;

        match self.cache.admit(candidate, now) {
            Admission::Buffered(_count) => {
                self.metrics.buffered_duplicates += 1;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::CandidateBuffered {
                        logical_id,
                        from,
                        candidates: _count,
                    }
                );
            }
            Admission::Stale => {
                self.metrics.stale_duplicates += 1;
                emit_debug!(
                    self,
                    crate::debug::DebugEvent::StaleDuplicate { logical_id, from }
                );
            }
            Admission::Unseen(first) => self.open_window(first, now),
        }
    }

    fn consume_at_gateway(&mut self, frame: Frame) {
        self.metrics.gateway_received += 1;
        let Frame { header, payload } = frame;
        self.push_event(Event::GatewayReceived {
            logical_id: header.logical_id,
            origin: header.origin,
            hop_count: header.hop_count,
            path: header.path,
            payload_len: payload.len(),
        });
    }

    fn open_window(&mut self, first: Candidate, now: Timestamp) {
        let logical_id = first.header.logical_id;

        if first.header.hop_count >= Cfg::MAX_HOPS {
            self.discard(logical_id, DiscardReason::MaxHopsExceeded);
            return;
        }
        if !self.cache.make_room() {
            self.discard(logical_id, DiscardReason::CacheFull);
            return;
        }

        let wait = self.random.gen_duration(Cfg::MIN_WAIT, Cfg::MAX_WAIT);
        let expires_at = now + wait;
        let handle = self
            .scheduler
            .schedule_after(wait, Timer::WindowClose { logical_id });
        let _hop_count = first.header.hop_count;
        self.cache.open(first, expires_at, handle);
        self.metrics.windows_opened += 1;

        emit_debug!(
            self,
            crate::debug::DebugEvent::WindowOpened {
                logical_id,
                hop_count: _hop_count,
                wait,
                expires_at,
            }
        );
    }

    // --- Timers ---

    /// Handle a timer this node registered.
    pub fn handle_timer(&mut self, timer: Timer) {
        if !self.running {
            return;
        }
        match timer {
            Timer::WindowClose { logical_id } => self.resolve_window(logical_id),
            Timer::Send => {
                self.send_timer = None;
                self.originate();
                self.arm_send_timer_if_live();
            }
        }
    }

    fn resolve_window(&mut self, logical_id: LogicalId) {
        let mut candidates = match self.cache.close(logical_id) {
            Some(c) => c,
            None => {
                emit_debug!(self, crate::debug::DebugEvent::LateTimer { logical_id });
                return;
            }
        };
        let count = candidates.len();
        let selection = select_winner(
            &candidates,
            self.settings.gateway_distance,
            Cfg::RETREAT_FACTOR,
        );

        emit_debug!(
            self,
            crate::debug::DebugEvent::WindowResolved {
                logical_id,
                candidates: count,
                winner: match selection {
                    Selection::Winner(i) => Some(i),
                    Selection::NoSpatialCandidate | Selection::FilteredOut => None,
                },
            }
        );

        match selection {
            Selection::NoSpatialCandidate => {
                self.discard(logical_id, DiscardReason::NoSpatialCandidate);
            }
            Selection::FilteredOut => {
                self.discard(logical_id, DiscardReason::FilteredOut);
            }
            Selection::Winner(idx) => {
                let winner = candidates.swap_remove(idx);
                self.forward(winner, count);
            }
        }
    }

    /// Re-broadcast the winning copy as relayed by this node.
    fn forward(&mut self, winner: Candidate, candidates: usize) {
        let logical_id = winner.header.logical_id;
        let header = match winner
            .header
            .relayed_by(self.settings.node_id, self.settings.gateway_distance)
        {
            Ok(h) => h,
            Err(_) => {
                self.discard(logical_id, DiscardReason::PathOverflow);
                return;
            }
        };
        let hop_count = header.hop_count;

        match self.encode_for_air(Frame::new(header, winner.payload)) {
            Ok(bytes) => {
                self.transport.broadcast(bytes);
                self.metrics.forwarded += 1;
                self.push_event(Event::Forwarded {
                    logical_id,
                    hop_count,
                    candidates,
                });
            }
            Err(reason) => self.discard(logical_id, reason),
        }
    }

    // --- Origination ---

    fn originate(&mut self) {
        let node_id = self.settings.node_id;
        let logical_id = match make_logical_id(node_id, self.send_counter) {
            Ok(id) => id,
            Err(_error) => {
                self.metrics.send_failures += 1;
                emit_debug!(self, crate::debug::DebugEvent::SendFailed { error: _error });
                // No further ids can be minted; stop the cadence.
                self.ids_exhausted = true;
                return;
            }
        };
        self.send_counter += 1;

        let header = RoutingHeader::originate(logical_id, node_id, self.settings.gateway_distance);
        let payload = vec![0u8; self.settings.payload_size];
        let payload_len = payload.len();

        match self.encode_for_air(Frame::new(header, payload)) {
            Ok(bytes) => {
                // Echoes of our own packet are stale from the start.
                let now = self.clock.now();
                if !self.cache.remember(logical_id, now) {
                    self.metrics.unrecorded_originations += 1;
                }
                self.transport.broadcast(bytes);
                self.metrics.originated += 1;
                self.push_event(Event::Originated {
                    logical_id,
                    payload_len,
                });
            }
            Err(reason) => {
                self.metrics.send_failures += 1;
                self.discard(logical_id, reason);
            }
        }
    }

    fn arm_send_timer(&mut self) {
        let handle = self
            .scheduler
            .schedule_after(self.settings.send_interval, Timer::Send);
        self.send_timer = Some(handle);
    }

    fn arm_send_timer_if_live(&mut self) {
        if self.running
            && self.settings.is_source
            && !self.ids_exhausted
            && self.send_timer.is_none()
        {
            self.arm_send_timer();
        }
    }

    // --- Helpers ---

    /// Encode a frame and check it against the radio MTU.
    fn encode_for_air(&self, frame: Frame) -> Result<Vec<u8>, DiscardReason> {
        let bytes = frame
            .encode_to_vec()
            .map_err(|_| DiscardReason::PathOverflow)?;
        if bytes.len() > self.transport.mtu() {
            return Err(DiscardReason::FrameTooLarge);
        }
        Ok(bytes)
    }

    fn discard(&mut self, logical_id: LogicalId, reason: DiscardReason) {
        self.metrics.discarded += 1;
        self.push_event(Event::Discarded { logical_id, reason });
    }

    /// Push an event to the events channel.
    fn push_event(&mut self, event: Event) {
        if self.events.try_send(event).is_err() {
            self.metrics.events_dropped += 1;
        }
    }

    #[cfg(any(test, feature = "debug"))]
    pub(crate) fn record_debug(&mut self, event: DebugEvent) {
        let _ = self.debug_channel.try_send(event);
    }
}
