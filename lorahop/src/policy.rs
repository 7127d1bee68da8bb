//! Window resolution policy.
//!
//! Applied once per logical id when its listening window closes:
//!
//! 1. Spatial filter: keep copies with
//!    `gateway_distance + retreat_factor > own gateway_distance`. Nothing left
//!    means the packet is dropped here.
//! 2. Hop filter: keep copies with the smallest `hop_count`.
//! 3. Tie-break: the first copy, in arrival order, carrying the largest
//!    `gateway_distance`. When several copies remain and none carries a
//!    positive rank, there is nothing to prefer and the packet is dropped. A
//!    lone survivor of the hop filter wins whatever its rank.
//!
//! Pure function of its inputs; no allocation.

use crate::cache::Candidate;
use crate::wire::RoutingHeader;

/// Outcome of [`select_winner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into the candidate slice of the copy to relay.
    Winner(usize),
    /// No copy passed the spatial filter.
    NoSpatialCandidate,
    /// Several fewest-hop copies, all with rank zero.
    FilteredOut,
}

/// Spatial filter for a single header. Computed in `u16` so a rank of 255
/// plus the retreat factor does not wrap.
#[inline]
pub fn passes_spatial_filter(header: &RoutingHeader, my_gateway_distance: u8, retreat: u8) -> bool {
    header.gateway_distance as u16 + retreat as u16 > my_gateway_distance as u16
}

/// Pick the copy to relay from a window's candidates.
pub fn select_winner(
    candidates: &[Candidate],
    my_gateway_distance: u8,
    retreat_factor: u8,
) -> Selection {
    let spatial = || {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| passes_spatial_filter(&c.header, my_gateway_distance, retreat_factor))
    };

    let min_hop = match spatial().map(|(_, c)| c.header.hop_count).min() {
        Some(h) => h,
        None => return Selection::NoSpatialCandidate,
    };

    let mut fewest_hops = 0usize;
    let mut best: Option<(usize, u8)> = None;
    for (idx, c) in spatial().filter(|(_, c)| c.header.hop_count == min_hop) {
        fewest_hops += 1;
        let gw = c.header.gateway_distance;
        match best {
            Some((_, best_gw)) if gw <= best_gw => {}
            _ => best = Some((idx, gw)),
        }
    }

    match best {
        Some((_, 0)) if fewest_hops > 1 => Selection::FilteredOut,
        Some((idx, _)) => Selection::Winner(idx),
        // min_hop came from a non-empty set, so F2 is non-empty.
        None => Selection::NoSpatialCandidate,
    }
}
