//! Region reconciliation
//!
//! Folds the fragments of independent detection passes into regions. Two
//! fragments belong to the same region only when their viewport rects are
//! exactly equal; there is no overlap-based matching.

use tracing::debug;

use super::region::{Region, RegionSet};
use crate::vision::{PassKind, TextFragment};

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    pub created: usize,
    pub merged: usize,
}

/// Merge one pass's fragments into the region list
pub fn reconcile_pass(
    regions: &mut RegionSet,
    pass: PassKind,
    fragments: &[TextFragment],
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for fragment in fragments {
        let mut fragment = fragment.clone();
        fragment.pass = pass;

        match regions.position_by_content_rect(&fragment.content_rect) {
            Some(index) => {
                regions.attach(index, fragment);
                stats.merged += 1;
            }
            None => {
                regions.push(Region::from_fragment(fragment));
                stats.created += 1;
            }
        }
    }

    debug!(
        "Reconciled {} pass: {} new regions, {} merged",
        pass.display_name(),
        stats.created,
        stats.merged
    );
    stats
}

/// Discard regions without text on any pass. Returns how many were removed.
pub fn prune_textless(regions: &mut RegionSet) -> usize {
    let before = regions.len();
    regions.retain(Region::has_text);
    before - regions.len()
}
