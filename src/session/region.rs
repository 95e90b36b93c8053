//! Regions ("boxes"): reconciled, pass-independent text areas

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use strsim::normalized_levenshtein;
use uuid::Uuid;

use crate::classify::{Attribute, Value};
use crate::vision::{PassKind, Rect, TextFragment};

/// Key of a region in the arena: the id of the fragment that created it
pub type RegionId = Uuid;

/// Review status a user assigns to a region or observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unmarked,
    Valid,
    Invalid,
    Irrelevant,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Unmarked,
        Status::Valid,
        Status::Invalid,
        Status::Irrelevant,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Status::Unmarked => "Unmarked",
            Status::Valid => "Valid",
            Status::Invalid => "Invalid",
            Status::Irrelevant => "Irrelevant",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.description())
    }
}

/// Which of {attribute, value1, value2} a region owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Unrecognized,
    Attribute,
    Value1,
    Value2,
    Value1Value2,
    AttributeValue1,
    AttributeValue2,
    AttributeValue1Value2,
}

impl RegionType {
    pub fn from_owned(attribute: bool, value1: bool, value2: bool) -> Self {
        match (attribute, value1, value2) {
            (true, true, true) => RegionType::AttributeValue1Value2,
            (true, true, false) => RegionType::AttributeValue1,
            (true, false, true) => RegionType::AttributeValue2,
            (true, false, false) => RegionType::Attribute,
            (false, true, true) => RegionType::Value1Value2,
            (false, true, false) => RegionType::Value1,
            (false, false, true) => RegionType::Value2,
            (false, false, false) => RegionType::Unrecognized,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RegionType::Unrecognized => "Unrecognized",
            RegionType::Attribute => "Attribute",
            RegionType::Value1 => "Value 1",
            RegionType::Value2 => "Value 2",
            RegionType::Value1Value2 => "Value 1 & 2",
            RegionType::AttributeValue1 => "Attribute & Value 1",
            RegionType::AttributeValue2 => "Attribute & Value 2",
            RegionType::AttributeValue1Value2 => "Attribute & Value 1 & 2",
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.description())
    }
}

/// Correction a user typed against a single region
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpectedOverride {
    pub attribute: Option<Attribute>,
    pub value1: Option<Value>,
    pub value2: Option<Value>,
}

/// Fields of a region's output row that live in other regions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelatedFields {
    /// Index of the anchor row in the classifier's nutrient table
    pub row_index: Option<usize>,
    pub attribute: Option<Attribute>,
    pub value1: Option<Value>,
    pub value2: Option<Value>,
    /// Other regions holding the row's attribute/value fragments
    pub boxes: Vec<RegionId>,
    /// Union of this region's box and every related region's box
    pub bounding_box_including_related: Rect,
}

impl RelatedFields {
    pub fn has_related_fields(&self) -> bool {
        self.attribute.is_some() || self.value1.is_some() || self.value2.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    /// Union of every merged fragment's id; never empty
    pub ids: BTreeSet<Uuid>,
    /// Normalized box, union over merged fragments
    pub bounding_box: Rect,
    /// Viewport geometry of the most recently attached fragment
    pub content_rect: Rect,
    /// At most one fragment per pass
    pub fragments: BTreeMap<PassKind, TextFragment>,
    pub attribute: Option<Attribute>,
    pub value1: Option<Value>,
    pub value2: Option<Value>,
    pub related: RelatedFields,
    pub status: Status,
    pub expected: Option<ExpectedOverride>,
}

impl Region {
    /// New region seeded from a single fragment
    pub fn from_fragment(fragment: TextFragment) -> Self {
        let mut ids = BTreeSet::new();
        ids.insert(fragment.id);
        let mut fragments = BTreeMap::new();
        let bounding_box = fragment.normalized_box;
        let content_rect = fragment.content_rect;
        let id = fragment.id;
        fragments.insert(fragment.pass, fragment);

        Self {
            id,
            ids,
            bounding_box,
            content_rect,
            fragments,
            attribute: None,
            value1: None,
            value2: None,
            related: RelatedFields {
                bounding_box_including_related: bounding_box,
                ..Default::default()
            },
            status: Status::default(),
            expected: None,
        }
    }

    /// Attach a fragment under its pass key, replacing any earlier fragment of
    /// the same pass. Ids and the bounding box only ever grow.
    pub fn attach(&mut self, fragment: TextFragment) {
        self.ids.insert(fragment.id);
        self.bounding_box = self.bounding_box.union(&fragment.normalized_box);
        self.content_rect = fragment.content_rect;
        self.fragments.insert(fragment.pass, fragment);
    }

    pub fn fragment(&self, pass: PassKind) -> Option<&TextFragment> {
        self.fragments.get(&pass)
    }

    pub fn region_type(&self) -> RegionType {
        RegionType::from_owned(
            self.attribute.is_some(),
            self.value1.is_some(),
            self.value2.is_some(),
        )
    }

    /// First non-empty text in canonical pass order
    pub fn title(&self) -> &str {
        self.fragments
            .values()
            .map(|f| f.text.as_str())
            .find(|t| !t.trim().is_empty())
            .unwrap_or("")
    }

    pub fn has_text(&self) -> bool {
        self.fragments.values().any(TextFragment::has_text)
    }

    pub fn has_classifier_result(&self) -> bool {
        self.attribute.is_some() || self.value1.is_some() || self.value2.is_some()
    }

    /// Lowest normalized Levenshtein similarity between the title and any
    /// other pass's text. 1.0 when all passes agree or only one pass saw it.
    pub fn variant_agreement(&self) -> f64 {
        let title = self.title();
        self.fragments
            .values()
            .filter(|f| f.has_text())
            .map(|f| normalized_levenshtein(title, &f.text))
            .fold(1.0, f64::min)
    }

    pub fn bounding_box_including_related(&self) -> Rect {
        self.related.bounding_box_including_related
    }

    /// Drop everything the correlator derived
    pub(crate) fn clear_correlation(&mut self) {
        self.attribute = None;
        self.value1 = None;
        self.value2 = None;
        self.related = RelatedFields {
            bounding_box_including_related: self.bounding_box,
            ..Default::default()
        };
    }
}

/// Ordered region arena with a fragment-id index
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    by_fragment: HashMap<Uuid, usize>,
    by_id: HashMap<RegionId, usize>,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut()
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.by_id.get(&id).map(|&i| &self.regions[i])
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        match self.by_id.get(&id) {
            Some(&i) => Some(&mut self.regions[i]),
            None => None,
        }
    }

    pub fn at(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Region> {
        self.regions.get_mut(index)
    }

    /// Position of the region owning a fragment id
    pub fn position_of_fragment(&self, fragment_id: Uuid) -> Option<usize> {
        self.by_fragment.get(&fragment_id).copied()
    }

    pub fn region_for_fragment(&self, fragment_id: Uuid) -> Option<&Region> {
        self.position_of_fragment(fragment_id).map(|i| &self.regions[i])
    }

    /// Position of the region whose viewport rect equals `rect` exactly
    pub fn position_by_content_rect(&self, rect: &Rect) -> Option<usize> {
        self.regions.iter().position(|r| r.content_rect == *rect)
    }

    pub fn push(&mut self, region: Region) -> usize {
        let index = self.regions.len();
        for id in &region.ids {
            self.by_fragment.insert(*id, index);
        }
        self.by_id.insert(region.id, index);
        self.regions.push(region);
        index
    }

    /// Attach a fragment to the region at `index` and index its id
    pub fn attach(&mut self, index: usize, fragment: TextFragment) {
        self.by_fragment.insert(fragment.id, index);
        self.regions[index].attach(fragment);
    }

    pub fn retain(&mut self, keep: impl FnMut(&Region) -> bool) {
        self.regions.retain(keep);
        self.reindex();
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.by_fragment.clear();
        self.by_id.clear();
    }

    fn reindex(&mut self) {
        self.by_fragment.clear();
        self.by_id.clear();
        for (index, region) in self.regions.iter().enumerate() {
            for id in &region.ids {
                self.by_fragment.insert(*id, index);
            }
            self.by_id.insert(region.id, index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Size;

    fn fragment(pass: PassKind, text: &str, rect: Rect) -> TextFragment {
        TextFragment {
            id: Uuid::new_v4(),
            pass,
            text: text.to_string(),
            normalized_box: rect,
            content_rect: rect,
        }
    }

    #[test]
    fn test_region_type_from_owned_fields() {
        assert_eq!(RegionType::from_owned(false, false, false), RegionType::Unrecognized);
        assert_eq!(RegionType::from_owned(true, false, false), RegionType::Attribute);
        assert_eq!(RegionType::from_owned(false, true, true), RegionType::Value1Value2);
        assert_eq!(RegionType::from_owned(true, true, true), RegionType::AttributeValue1Value2);
    }

    #[test]
    fn test_title_falls_back_to_later_passes() {
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        let mut region = Region::from_fragment(fragment(PassKind::WithCorrection, "", rect));
        region.attach(fragment(PassKind::FastRecognition, "Iron", rect));
        assert_eq!(region.title(), "Iron");
        assert!(region.has_text());
    }

    #[test]
    fn test_variant_agreement() {
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        let mut region =
            Region::from_fragment(fragment(PassKind::WithCorrection, "Calories", rect));
        assert_eq!(region.variant_agreement(), 1.0);

        region.attach(fragment(PassKind::WithoutCorrection, "Calories", rect));
        assert_eq!(region.variant_agreement(), 1.0);

        region.attach(fragment(PassKind::FastRecognition, "Calorles", rect));
        let agreement = region.variant_agreement();
        assert!(agreement < 1.0 && agreement > 0.8, "{agreement}");
    }

    #[test]
    fn test_set_indexes_attached_fragments() {
        let rect = Rect::new(1.0, 1.0, 2.0, 2.0);
        let first = fragment(PassKind::WithCorrection, "Salt", rect);
        let second = fragment(PassKind::WithoutCorrection, "Salt", rect);
        let second_id = second.id;

        let mut set = RegionSet::new();
        let index = set.push(Region::from_fragment(first.clone()));
        set.attach(index, second);

        assert_eq!(set.position_of_fragment(first.id), Some(0));
        assert_eq!(set.position_of_fragment(second_id), Some(0));
        assert_eq!(set.get(first.id).map(|r| r.ids.len()), Some(2));
    }

    #[test]
    fn test_retain_rebuilds_index() {
        let a = fragment(PassKind::WithCorrection, "", Rect::new(0.0, 0.0, 1.0, 1.0));
        let b = fragment(PassKind::WithCorrection, "Fat", Rect::new(5.0, 0.0, 1.0, 1.0));
        let b_id = b.id;

        let mut set = RegionSet::new();
        set.push(Region::from_fragment(a.clone()));
        set.push(Region::from_fragment(b));
        set.retain(Region::has_text);

        assert_eq!(set.len(), 1);
        assert_eq!(set.position_of_fragment(a.id), None);
        assert_eq!(set.position_of_fragment(b_id), Some(0));
    }

    #[test]
    fn test_clear_correlation_resets_union_box() {
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        let mut region = Region::from_fragment(TextFragment::new(
            Uuid::new_v4(),
            PassKind::WithCorrection,
            "Fat",
            rect,
            Size::new(1.0, 1.0),
            Size::new(1.0, 1.0),
        ));
        region.attribute = Some(Attribute::Fat);
        region.related.bounding_box_including_related = Rect::new(0.0, 0.0, 5.0, 5.0);

        region.clear_correlation();

        assert_eq!(region.region_type(), RegionType::Unrecognized);
        assert_eq!(region.bounding_box_including_related(), rect);
    }
}
