//! Proximity Matching
//!
//! Decides which nearby opposing player, if any, the local player should duel.
//! Both peers run this independently over their own cached snapshots, so the
//! choice must not depend on iteration order.

use crate::game::player::{Player, PlayerId};

/// Default meeting distance in meters (beacon-scale proximity).
pub const DEFAULT_PROXIMITY_METERS: f64 = 2.0;

/// True if `candidate` may be challenged by `me` at the given threshold.
///
/// Requires known positions on both sides, a different team and a great-circle
/// distance of at most `threshold_meters`.
pub fn is_eligible(me: &Player, candidate: &Player, threshold_meters: f64) -> bool {
    if candidate.id == me.id || !me.is_opponent_of(candidate) {
        return false;
    }
    match (me.position, candidate.position) {
        (Some(mine), Some(theirs)) => mine.distance_meters(&theirs) <= threshold_meters,
        _ => false,
    }
}

/// Find the opponent to challenge.
///
/// When several candidates qualify the lexicographically lowest id wins,
/// whatever order `candidates` yields them in.
pub fn find_eligible_opponent<'a>(
    me: &Player,
    candidates: impl IntoIterator<Item = &'a Player>,
    threshold_meters: f64,
) -> Option<PlayerId> {
    candidates
        .into_iter()
        .filter(|candidate| is_eligible(me, candidate, threshold_meters))
        .map(|candidate| &candidate.id)
        .min()
        .cloned()
}
