//! Output correlation
//!
//! Attaches classifier rows to regions. A region owns the fields whose fragment
//! ids it holds; the other fields of its anchor row are "related" and live in
//! other regions.

use tracing::debug;

use super::region::{RegionId, RegionSet, RelatedFields};
use crate::classify::ClassifierOutput;
use crate::vision::Rect;

/// Counts from one correlation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrelationStats {
    pub recognized: usize,
    pub unrecognized: usize,
}

/// Correlate every region with the classifier's nutrient rows.
///
/// Regions without a matching row end up with no attribute or values.
pub fn correlate(output: Option<&ClassifierOutput>, regions: &mut RegionSet) -> CorrelationStats {
    for region in regions.iter_mut() {
        region.clear_correlation();
    }

    let Some(output) = output else {
        let stats = CorrelationStats {
            recognized: 0,
            unrecognized: regions.len(),
        };
        debug!("No classifier output; {} regions unrecognized", stats.unrecognized);
        return stats;
    };

    let rows = &output.nutrients.rows;
    let mut anchor_rows: Vec<Option<usize>> = vec![None; regions.len()];

    // Owned fields and anchor rows, first row wins
    for (row_index, row) in rows.iter().enumerate() {
        for id in row.ids() {
            if let Some(position) = regions.position_of_fragment(id) {
                anchor_rows[position].get_or_insert(row_index);
            }
        }

        if let Some(region) = regions
            .position_of_fragment(row.attribute_id())
            .and_then(|p| regions.at_mut(p))
        {
            region.attribute.get_or_insert(row.attribute());
        }
        if let (Some(id), Some(value)) = (row.value1_id(), row.value1()) {
            if let Some(region) = regions.position_of_fragment(id).and_then(|p| regions.at_mut(p)) {
                region.value1.get_or_insert(value);
            }
        }
        if let (Some(id), Some(value)) = (row.value2_id(), row.value2()) {
            if let Some(region) = regions.position_of_fragment(id).and_then(|p| regions.at_mut(p)) {
                region.value2.get_or_insert(value);
            }
        }
    }

    // Related fields need every region's box, so compute before applying
    let mut related: Vec<(usize, RelatedFields)> = Vec::new();
    for (position, anchor) in anchor_rows.iter().enumerate() {
        let (Some(row_index), Some(region)) = (*anchor, regions.at(position)) else {
            continue;
        };
        let row = &rows[row_index];

        let mut boxes: Vec<RegionId> = Vec::new();
        let mut union = region.bounding_box;
        for id in row.ids() {
            let Some(other) = regions.region_for_fragment(id) else {
                continue;
            };
            if other.id == region.id || boxes.contains(&other.id) {
                continue;
            }
            boxes.push(other.id);
            union = union.union(&other.bounding_box);
        }

        let owns = |id: Option<uuid::Uuid>| id.map(|id| region.ids.contains(&id)).unwrap_or(false);
        related.push((
            position,
            RelatedFields {
                row_index: Some(row_index),
                attribute: (!region.ids.contains(&row.attribute_id())).then(|| row.attribute()),
                value1: if owns(row.value1_id()) { None } else { row.value1() },
                value2: if owns(row.value2_id()) { None } else { row.value2() },
                boxes,
                bounding_box_including_related: union,
            },
        ));
    }

    for (position, fields) in related {
        if let Some(region) = regions.at_mut(position) {
            region.related = fields;
        }
    }

    let recognized = regions.iter().filter(|r| r.has_classifier_result()).count();
    let stats = CorrelationStats {
        recognized,
        unrecognized: regions.len() - recognized,
    };
    debug!(
        "Correlated {} rows: {} regions recognized, {} unrecognized",
        rows.len(),
        stats.recognized,
        stats.unrecognized
    );
    stats
}

/// Union of a set of boxes, or `None` when empty
pub fn union_of<'a>(boxes: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
    boxes.into_iter().fold(None, |acc: Option<Rect>, b| {
        Some(acc.map(|a| a.union(b)).unwrap_or(*b))
    })
}
