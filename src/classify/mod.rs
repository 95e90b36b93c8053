//! Classification Layer
//!
//! Attribute vocabulary, the classifier's structured output, and the
//! boundary to the external label classifier.

pub mod attribute;
pub mod output;

pub use attribute::{Attribute, HeaderType, NutritionUnit, Value, ValueShape};
pub use output::{
    AttributeText, ClassifierOutput, DoubleText, HeaderServing, HeaderText, NutrientRow,
    NutrientsOutput, ServingOutput, StringText, UnitText, ValueText,
};

use std::collections::BTreeMap;

use crate::vision::{PassKind, TextFragment};

/// External label classifier. Consumes the fragments of every completed pass.
pub trait Classifier: Send + Sync {
    fn classify(
        &self,
        fragments_by_pass: &BTreeMap<PassKind, Vec<TextFragment>>,
    ) -> ClassifierOutput;
}

/// Classifier returning a previously captured output
#[derive(Debug, Clone, Default)]
pub struct RecordedClassifier {
    output: ClassifierOutput,
}

impl RecordedClassifier {
    pub fn new(output: ClassifierOutput) -> Self {
        Self { output }
    }
}

impl Classifier for RecordedClassifier {
    fn classify(
        &self,
        _fragments_by_pass: &BTreeMap<PassKind, Vec<TextFragment>>,
    ) -> ClassifierOutput {
        self.output.clone()
    }
}
