//! Expectation Store
//!
//! User supplied ground-truth values. At most one per attribute, and the value
//! shape must match the attribute's declared shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::observation::AttributeValue;
use crate::classify::Attribute;

#[derive(Debug, Error, PartialEq)]
pub enum ExpectationError {
    #[error("an expectation for `{0}` already exists")]
    Duplicate(Attribute),

    #[error("`{attribute}` expects a {expected:?} value, got {actual:?}")]
    ShapeMismatch {
        attribute: Attribute,
        expected: crate::classify::ValueShape,
        actual: crate::classify::ValueShape,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    pub attribute: Attribute,
    pub value: AttributeValue,
}

impl Expectation {
    pub fn new(attribute: Attribute, value: AttributeValue) -> Self {
        Self { attribute, value }
    }

    pub fn description(&self) -> String {
        format!("{}: {}", self.attribute.description(), self.value)
    }
}

/// Insertion-ordered set of expectations keyed by attribute
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectationStore {
    expectations: Vec<Expectation>,
}

impl ExpectationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expectation: Expectation) -> Result<(), ExpectationError> {
        let attribute = expectation.attribute;
        if self.get(attribute).is_some() {
            return Err(ExpectationError::Duplicate(attribute));
        }
        let expected = attribute.expected_shape();
        let actual = expectation.value.shape();
        if expected != actual {
            return Err(ExpectationError::ShapeMismatch {
                attribute,
                expected,
                actual,
            });
        }
        self.expectations.push(expectation);
        Ok(())
    }

    /// Delete the expectation for `attribute`, returning it if present
    pub fn remove(&mut self, attribute: Attribute) -> Option<Expectation> {
        let index = self.expectations.iter().position(|e| e.attribute == attribute)?;
        Some(self.expectations.remove(index))
    }

    pub fn get(&self, attribute: Attribute) -> Option<&Expectation> {
        self.expectations.iter().find(|e| e.attribute == attribute)
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.get(attribute).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expectation> {
        self.expectations.iter()
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn clear(&mut self) {
        self.expectations.clear();
    }

    pub fn serving(&self) -> impl Iterator<Item = &Expectation> {
        self.iter().filter(|e| e.attribute.is_serving_attribute())
    }

    pub fn headers(&self) -> impl Iterator<Item = &Expectation> {
        self.iter().filter(|e| e.attribute.is_header_attribute())
    }

    pub fn nutrients(&self) -> impl Iterator<Item = &Expectation> {
        self.iter().filter(|e| e.attribute.is_nutrient_attribute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{HeaderType, NutritionUnit, Value, ValueShape};

    fn sodium() -> Expectation {
        Expectation::new(
            Attribute::Sodium,
            AttributeValue::Values {
                value1: Some(Value::new(120.0, Some(NutritionUnit::Mg))),
                value2: None,
            },
        )
    }

    #[test]
    fn test_add_and_get() {
        let mut store = ExpectationStore::new();
        store.add(sodium()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(Attribute::Sodium), Some(&sodium()));
        assert_eq!(sodium().description(), "Sodium: 120 mg");
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let mut store = ExpectationStore::new();
        store.add(sodium()).unwrap();
        assert_eq!(store.add(sodium()), Err(ExpectationError::Duplicate(Attribute::Sodium)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut store = ExpectationStore::new();
        let err = store
            .add(Expectation::new(Attribute::ServingAmount, AttributeValue::String("one".into())))
            .unwrap_err();
        assert_eq!(
            err,
            ExpectationError::ShapeMismatch {
                attribute: Attribute::ServingAmount,
                expected: ValueShape::Double,
                actual: ValueShape::String,
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_and_groups() {
        let mut store = ExpectationStore::new();
        store.add(sodium()).unwrap();
        store
            .add(Expectation::new(Attribute::ServingAmount, AttributeValue::Double(30.0)))
            .unwrap();
        store
            .add(Expectation::new(
                Attribute::HeaderType1,
                AttributeValue::Header(HeaderType::Per100g),
            ))
            .unwrap();

        assert_eq!(store.serving().count(), 1);
        assert_eq!(store.headers().count(), 1);
        assert_eq!(store.nutrients().count(), 1);

        assert!(store.remove(Attribute::Sodium).is_some());
        assert!(store.remove(Attribute::Sodium).is_none());
        assert!(!store.contains(Attribute::Sodium));
        assert_eq!(store.len(), 2);
    }
}
