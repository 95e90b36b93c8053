//! Session Layer
//!
//! One picked image and everything derived from it: per-pass fragments,
//! reconciled regions, classifier output, observations and expectations.
//! A [`Session`] is owned explicitly; there is no ambient global.

pub mod correlate;
pub mod expectation;
pub mod observation;
pub mod reconcile;
pub mod record;
pub mod region;

pub use correlate::{correlate, CorrelationStats};
pub use expectation::{Expectation, ExpectationError, ExpectationStore};
pub use observation::{build_observations, AttributeValue, Observation};
pub use reconcile::{prune_textless, reconcile_pass, ReconcileStats};
pub use record::{RecordedFragment, SessionRecord};
pub use region::{
    ExpectedOverride, Region, RegionId, RegionSet, RegionType, RelatedFields, Status,
};

use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::{Attribute, ClassifierOutput, HeaderType};
use crate::vision::{PassKind, Rect, Size, TextFragment};

/// Live state of one picked image
#[derive(Debug, Default)]
pub struct Session {
    generation: u64,
    image: Option<Vec<u8>>,
    image_size: Size,
    content_size: Size,
    fragments_by_pass: BTreeMap<PassKind, Vec<TextFragment>>,
    regions: RegionSet,
    output: Option<ClassifierOutput>,
    observations: Vec<Observation>,
    pub expectations: ExpectationStore,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all state and start a new generation
    pub fn reset(&mut self) -> u64 {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
        generation
    }

    /// Reset and start a session for a freshly picked image
    pub fn begin(&mut self, image: Vec<u8>, image_size: Size, content_size: Size) -> u64 {
        let generation = self.reset();
        self.image = Some(image);
        self.image_size = image_size;
        self.content_size = content_size;
        info!(
            "Session {} started for {}x{} image",
            generation, image_size.width, image_size.height
        );
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    pub fn image_size(&self) -> Size {
        self.image_size
    }

    pub fn content_size(&self) -> Size {
        self.content_size
    }

    pub fn fragments_by_pass(&self) -> &BTreeMap<PassKind, Vec<TextFragment>> {
        &self.fragments_by_pass
    }

    pub fn completed_passes(&self) -> impl Iterator<Item = PassKind> + '_ {
        self.fragments_by_pass.keys().copied()
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn output(&self) -> Option<&ClassifierOutput> {
        self.output.as_ref()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// First observation of `attribute`
    pub fn observation(&self, attribute: Attribute) -> Option<&Observation> {
        self.observations.iter().find(|o| o.attribute == attribute)
    }

    /// Positions of every observation of `attribute`. A nutrient may appear on
    /// several rows, e.g. energy in both kJ and kcal.
    pub fn observation_indices(&self, attribute: Attribute) -> Vec<usize> {
        self.observations
            .iter()
            .enumerate()
            .filter(|(_, o)| o.attribute == attribute)
            .map(|(i, _)| i)
            .collect()
    }

    /// Retain one pass's fragments, laid out for the current viewport
    pub fn record_pass(&mut self, pass: PassKind, fragments: Vec<TextFragment>) {
        if fragments.is_empty() {
            debug!("{} pass returned no fragments", pass.display_name());
        }
        let laid_out = fragments
            .into_iter()
            .map(|f| TextFragment {
                pass,
                ..f.laid_out(self.image_size, self.content_size)
            })
            .collect();
        self.fragments_by_pass.insert(pass, laid_out);
    }

    /// Reconcile the retained fragments of `passes`, in canonical order, then
    /// drop regions without text
    pub fn reconcile(&mut self, passes: &[PassKind]) -> ReconcileStats {
        let mut passes = passes.to_vec();
        passes.sort();
        passes.dedup();

        let mut total = ReconcileStats::default();
        for pass in passes {
            let Some(fragments) = self.fragments_by_pass.get(&pass) else {
                continue;
            };
            let stats = reconcile_pass(&mut self.regions, pass, fragments);
            total.created += stats.created;
            total.merged += stats.merged;
        }

        let pruned = prune_textless(&mut self.regions);
        info!(
            "Reconciled {} regions ({} created, {} merged, {} pruned)",
            self.regions.len(),
            total.created,
            total.merged,
            pruned
        );
        total
    }

    /// Re-project retained fragments for a new viewport without re-running
    /// detection. Each region takes the rect of its last pass.
    pub fn relayout(&mut self, content_size: Size) {
        self.content_size = content_size;
        let (image_size, content_size) = (self.image_size, self.content_size);

        for fragments in self.fragments_by_pass.values_mut() {
            for fragment in fragments.iter_mut() {
                fragment.content_rect = fragment.normalized_box.projected(image_size, content_size);
            }
        }

        for region in self.regions.iter_mut() {
            for fragment in region.fragments.values_mut() {
                fragment.content_rect = fragment.normalized_box.projected(image_size, content_size);
            }
            if let Some(last) = region.fragments.values().last() {
                region.content_rect = last.content_rect;
            }
        }
        debug!(
            "Relayout to {}x{}: {} regions",
            content_size.width,
            content_size.height,
            self.regions.len()
        );
    }

    /// Store classifier output, correlate regions and rebuild observations
    pub fn apply_classification(&mut self, output: Option<ClassifierOutput>) -> CorrelationStats {
        self.output = output;
        let stats = correlate(self.output.as_ref(), &mut self.regions);
        self.observations = self.output.as_ref().map(build_observations).unwrap_or_default();
        info!(
            "Classified: {} observations, {} regions recognized",
            self.observations.len(),
            stats.recognized
        );
        stats
    }

    pub fn set_region_status(&mut self, id: RegionId, status: Status) -> bool {
        match self.regions.get_mut(id) {
            Some(region) => {
                region.status = status;
                true
            }
            None => false,
        }
    }

    pub fn set_region_expected(
        &mut self,
        id: RegionId,
        expected: Option<ExpectedOverride>,
    ) -> bool {
        match self.regions.get_mut(id) {
            Some(region) => {
                region.expected = expected;
                true
            }
            None => false,
        }
    }

    /// Regions matching both optional filters
    pub fn filtered_regions(
        &self,
        status: Option<Status>,
        region_type: Option<RegionType>,
    ) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .filter(|r| region_type.map_or(true, |t| r.region_type() == t))
            .collect()
    }

    /// Set the status of the observation at `index` and of every region
    /// reachable from it
    pub fn set_observation_status_at(&mut self, index: usize, status: Status) -> bool {
        let Some(observation) = self.observations.get_mut(index) else {
            return false;
        };
        observation.status = status;
        mark_regions(&mut self.regions, &observation.source_fragment_ids, status);
        true
    }

    /// Set the status of every observation of `attribute`
    pub fn set_observation_status(&mut self, attribute: Attribute, status: Status) -> bool {
        let indices = self.observation_indices(attribute);
        for &index in &indices {
            self.set_observation_status_at(index, status);
        }
        !indices.is_empty()
    }

    /// Mark every observation and every region reachable from one as valid
    pub fn validate_all(&mut self) {
        for observation in self.observations.iter_mut() {
            observation.status = Status::Valid;
            mark_regions(&mut self.regions, &observation.source_fragment_ids, Status::Valid);
        }
        info!("Validated {} observations", self.observations.len());
    }

    /// Distinct regions justifying the observation at `index`, in source-id order
    pub fn observation_regions_at(&self, index: usize) -> Vec<&Region> {
        let mut regions: Vec<&Region> = Vec::new();
        let Some(observation) = self.observations.get(index) else {
            return regions;
        };
        for id in &observation.source_fragment_ids {
            if let Some(region) = self.regions.region_for_fragment(*id) {
                if !regions.iter().any(|r| r.id == region.id) {
                    regions.push(region);
                }
            }
        }
        regions
    }

    /// Distinct regions justifying any observation of `attribute`
    pub fn observation_regions(&self, attribute: Attribute) -> Vec<&Region> {
        let mut regions: Vec<&Region> = Vec::new();
        for index in self.observation_indices(attribute) {
            for region in self.observation_regions_at(index) {
                if !regions.iter().any(|r| r.id == region.id) {
                    regions.push(region);
                }
            }
        }
        regions
    }

    pub fn observation_bounding_box_at(&self, index: usize) -> Option<Rect> {
        correlate::union_of(self.observation_regions_at(index).iter().map(|r| &r.bounding_box))
    }

    pub fn observation_bounding_box(&self, attribute: Attribute) -> Option<Rect> {
        correlate::union_of(self.observation_regions(attribute).iter().map(|r| &r.bounding_box))
    }

    /// An expectation may be added when none exists yet and the classifier
    /// either missed the attribute or every observation of it was marked invalid
    pub fn should_allow_adding(&self, attribute: Attribute) -> bool {
        if self.expectations.contains(attribute) {
            return false;
        }
        self.observations
            .iter()
            .filter(|o| o.attribute == attribute)
            .all(|o| o.status == Status::Invalid)
    }

    pub fn unused_serving_attributes(&self) -> Vec<Attribute> {
        self.unused_attributes(Attribute::is_serving_attribute)
    }

    pub fn unused_header_attributes(&self) -> Vec<Attribute> {
        self.unused_attributes(Attribute::is_header_attribute)
    }

    pub fn unused_nutrient_attributes(&self) -> Vec<Attribute> {
        self.unused_attributes(Attribute::is_nutrient_attribute)
    }

    fn unused_attributes(&self, in_group: fn(&Attribute) -> bool) -> Vec<Attribute> {
        Attribute::ALL
            .iter()
            .copied()
            .filter(|a| in_group(a) && self.should_allow_adding(*a))
            .collect()
    }

    /// Header types not already taken by a trusted header observation or an
    /// expectation. Empty before classification.
    pub fn available_header_types(&self) -> Vec<HeaderType> {
        if self.output.is_none() {
            return Vec::new();
        }
        let taken = |header_type: HeaderType| {
            self.observations
                .iter()
                .filter(|o| matches!(o.attribute, Attribute::HeaderType1 | Attribute::HeaderType2))
                .filter(|o| o.status != Status::Invalid)
                .any(|o| o.value.header_type() == Some(header_type))
                || self
                    .expectations
                    .iter()
                    .any(|e| e.value.header_type() == Some(header_type))
        };
        HeaderType::ALL.into_iter().filter(|h| !taken(*h)).collect()
    }

    /// `Unmarked` while nothing is marked or anything is invalid
    pub fn overall_status(&self) -> Status {
        let marked = self.observations.iter().any(|o| o.status != Status::Unmarked);
        let any_invalid = self.observations.iter().any(|o| o.status == Status::Invalid);
        if !marked || any_invalid {
            Status::Unmarked
        } else {
            Status::Valid
        }
    }
}

fn mark_regions(regions: &mut RegionSet, fragment_ids: &[Uuid], status: Status) {
    for id in fragment_ids {
        if let Some(region) = regions.position_of_fragment(*id).and_then(|p| regions.at_mut(p)) {
            region.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{
        AttributeText, HeaderText, NutrientRow, NutrientsOutput, NutritionUnit, Value, ValueText,
    };
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    const IMAGE: Size = Size { width: 200.0, height: 100.0 };

    fn raw(text: &str, normalized_box: Rect) -> TextFragment {
        TextFragment {
            id: Uuid::new_v4(),
            pass: PassKind::WithCorrection,
            text: text.to_string(),
            normalized_box,
            content_rect: Rect::zero(),
        }
    }

    /// Session with a "Sodium" / "120mg" pair on two passes, classified
    fn classified_session() -> (Session, TextFragment, TextFragment) {
        let attribute = raw("Sodium", Rect::new(0.0, 0.0, 0.25, 0.125));
        let value = raw("120mg", Rect::new(0.5, 0.0, 0.25, 0.125));

        let mut session = Session::new();
        session.begin(vec![1, 2, 3], IMAGE, IMAGE);
        session.record_pass(PassKind::WithCorrection, vec![attribute.clone(), value.clone()]);
        session.record_pass(
            PassKind::WithoutCorrection,
            vec![raw("Sodium", attribute.normalized_box)],
        );
        session.reconcile(&PassKind::ALL);

        let output = ClassifierOutput {
            serving: None,
            nutrients: NutrientsOutput {
                header_text1: Some(HeaderText {
                    header_type: HeaderType::Per100g,
                    text_id: Uuid::new_v4(),
                    attribute_text_id: Uuid::new_v4(),
                    serving: None,
                }),
                header_text2: None,
                rows: vec![NutrientRow {
                    attribute_text: AttributeText {
                        attribute: Attribute::Sodium,
                        text_id: attribute.id,
                    },
                    value_text1: Some(ValueText {
                        value: Value::new(120.0, Some(NutritionUnit::Mg)),
                        text_id: value.id,
                    }),
                    value_text2: None,
                }],
            },
        };
        session.apply_classification(Some(output));
        (session, attribute, value)
    }

    #[test]
    fn test_pipeline_builds_regions_and_observations() {
        let (session, attribute, value) = classified_session();

        assert_eq!(session.regions().len(), 2);
        let region = session.regions().get(attribute.id).unwrap();
        assert_eq!(region.fragments.len(), 2);
        assert_eq!(region.content_rect, Rect::new(0.0, 0.0, 50.0, 12.5));
        assert_eq!(region.region_type(), RegionType::Attribute);
        assert_eq!(
            session.regions().get(value.id).unwrap().region_type(),
            RegionType::Value1
        );
        assert_eq!(
            session.observations().iter().map(|o| o.attribute).collect::<Vec<_>>(),
            vec![Attribute::HeaderType1, Attribute::Sodium]
        );
    }

    #[test]
    fn test_reset_discards_previous_state() {
        let (mut session, _, _) = classified_session();
        let before = session.generation();
        let generation = session.reset();

        assert_eq!(generation, before + 1);
        assert!(session.regions().is_empty());
        assert!(session.observations().is_empty());
        assert!(session.fragments_by_pass().is_empty());
        assert!(session.image().is_none());
    }

    #[test]
    fn test_observation_status_propagates_to_regions() {
        let (mut session, attribute, value) = classified_session();
        assert!(session.set_observation_status(Attribute::Sodium, Status::Invalid));

        assert_eq!(session.regions().get(attribute.id).unwrap().status, Status::Invalid);
        assert_eq!(session.regions().get(value.id).unwrap().status, Status::Invalid);
        assert!(!session.set_observation_status(Attribute::Fat, Status::Valid));
    }

    #[test]
    fn test_validate_all() {
        let (mut session, _, _) = classified_session();
        assert_eq!(session.overall_status(), Status::Unmarked);

        session.validate_all();
        assert!(session.observations().iter().all(|o| o.status == Status::Valid));
        assert!(session.regions().iter().all(|r| r.status == Status::Valid));
        assert_eq!(session.overall_status(), Status::Valid);

        session.set_observation_status(Attribute::Sodium, Status::Invalid);
        assert_eq!(session.overall_status(), Status::Unmarked);
    }

    #[test]
    fn test_filtered_regions() {
        let (mut session, attribute, _) = classified_session();
        session.set_region_status(attribute.id, Status::Irrelevant);

        assert_eq!(session.filtered_regions(None, None).len(), 2);
        assert_eq!(session.filtered_regions(Some(Status::Irrelevant), None).len(), 1);
        assert_eq!(session.filtered_regions(None, Some(RegionType::Value1)).len(), 1);
        assert!(session
            .filtered_regions(Some(Status::Irrelevant), Some(RegionType::Value1))
            .is_empty());
    }

    #[test]
    fn test_observation_bounding_box() {
        let (session, _, _) = classified_session();
        assert_eq!(session.observation_regions(Attribute::Sodium).len(), 2);
        assert_eq!(
            session.observation_bounding_box(Attribute::Sodium),
            Some(Rect::new(0.0, 0.0, 0.75, 0.125))
        );
        // header fragments never made it into a region
        assert_eq!(session.observation_bounding_box(Attribute::HeaderType1), None);
    }

    #[test]
    fn test_should_allow_adding() {
        let (mut session, _, _) = classified_session();
        assert!(session.should_allow_adding(Attribute::Fat));
        assert!(!session.should_allow_adding(Attribute::Sodium));
        assert!(!session.unused_nutrient_attributes().contains(&Attribute::Sodium));

        session.set_observation_status(Attribute::Sodium, Status::Invalid);
        assert!(session.should_allow_adding(Attribute::Sodium));

        session
            .expectations
            .add(Expectation::new(
                Attribute::Sodium,
                AttributeValue::Values {
                    value1: Some(Value::new(120.0, Some(NutritionUnit::Mg))),
                    value2: None,
                },
            ))
            .unwrap();
        assert!(!session.should_allow_adding(Attribute::Sodium));
        assert!(!session.unused_header_attributes().contains(&Attribute::HeaderType1));
        assert!(session.unused_serving_attributes().contains(&Attribute::ServingAmount));
    }

    #[test]
    fn test_available_header_types() {
        let (mut session, _, _) = classified_session();
        assert_eq!(
            session.available_header_types(),
            vec![HeaderType::Per100ml, HeaderType::PerServing]
        );

        session.set_observation_status(Attribute::HeaderType1, Status::Invalid);
        session
            .expectations
            .add(Expectation::new(
                Attribute::HeaderType2,
                AttributeValue::Header(HeaderType::PerServing),
            ))
            .unwrap();
        assert_eq!(
            session.available_header_types(),
            vec![HeaderType::Per100g, HeaderType::Per100ml]
        );

        assert!(Session::new().available_header_types().is_empty());
    }

    /// Energy listed twice, in kJ and kcal, each on its own line
    fn energy_session() -> Session {
        let kj_label = raw("Energy", Rect::new(0.0, 0.0, 0.25, 0.125));
        let kj_value = raw("1000kJ", Rect::new(0.5, 0.0, 0.25, 0.125));
        let kcal_label = raw("Energy", Rect::new(0.0, 0.25, 0.25, 0.125));
        let kcal_value = raw("240kcal", Rect::new(0.5, 0.25, 0.25, 0.125));

        let mut session = Session::new();
        session.begin(vec![1, 2, 3], IMAGE, IMAGE);
        session.record_pass(
            PassKind::WithCorrection,
            vec![
                kj_label.clone(),
                kj_value.clone(),
                kcal_label.clone(),
                kcal_value.clone(),
            ],
        );
        session.reconcile(&PassKind::ALL);

        let row = |label: &TextFragment, value: &TextFragment, amount, unit| NutrientRow {
            attribute_text: AttributeText {
                attribute: Attribute::Energy,
                text_id: label.id,
            },
            value_text1: Some(ValueText {
                value: Value::new(amount, Some(unit)),
                text_id: value.id,
            }),
            value_text2: None,
        };
        session.apply_classification(Some(ClassifierOutput {
            serving: None,
            nutrients: NutrientsOutput {
                header_text1: None,
                header_text2: None,
                rows: vec![
                    row(&kj_label, &kj_value, 1000.0, NutritionUnit::Kj),
                    row(&kcal_label, &kcal_value, 240.0, NutritionUnit::Kcal),
                ],
            },
        }));
        session
    }

    #[test]
    fn test_repeated_attribute_rows_are_addressed_by_index() {
        let mut session = energy_session();
        assert_eq!(session.observation_indices(Attribute::Energy), vec![0, 1]);

        assert!(session.set_observation_status_at(1, Status::Invalid));
        assert_eq!(session.observations()[0].status, Status::Unmarked);
        assert_eq!(session.observations()[1].status, Status::Invalid);
        assert!(session
            .observation_regions_at(1)
            .iter()
            .all(|r| r.status == Status::Invalid));
        assert!(session
            .observation_regions_at(0)
            .iter()
            .all(|r| r.status == Status::Unmarked));
        assert_eq!(
            session.observation_bounding_box_at(1),
            Some(Rect::new(0.0, 0.25, 0.75, 0.125))
        );
        assert!(!session.set_observation_status_at(2, Status::Valid));

        // one row still trusted, so no expectation may be added
        assert!(!session.should_allow_adding(Attribute::Energy));
        session.set_observation_status_at(0, Status::Invalid);
        assert!(session.should_allow_adding(Attribute::Energy));
    }

    #[test]
    fn test_set_observation_status_by_attribute_covers_every_row() {
        let mut session = energy_session();
        assert!(session.set_observation_status(Attribute::Energy, Status::Valid));
        assert!(session.observations().iter().all(|o| o.status == Status::Valid));
        assert_eq!(session.observation_regions(Attribute::Energy).len(), 4);
    }

    #[test]
    fn test_relayout_keeps_regions_and_statuses() {
        let (mut session, attribute, _) = classified_session();
        session.set_region_status(attribute.id, Status::Valid);

        session.relayout(Size::new(400.0, 400.0));

        let region = session.regions().get(attribute.id).unwrap();
        assert_eq!(region.status, Status::Valid);
        // 400x400 viewport fits the 2:1 image as 400x200, offset 100 down
        assert_eq!(region.content_rect, Rect::new(0.0, 100.0, 100.0, 25.0));

        // re-reconciling after relayout merges into the same regions
        let stats = session.reconcile(&PassKind::ALL);
        assert_eq!(stats.created, 0);
        assert_eq!(session.regions().len(), 2);
    }
}
