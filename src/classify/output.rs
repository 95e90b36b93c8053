//! Structured classifier output
//!
//! Every recognized field keeps the id of the text fragment it was read from,
//! which is what lets regions and observations be traced back to each other.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attribute::{Attribute, HeaderType, NutritionUnit, Value};

/// Attribute read from a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeText {
    pub attribute: Attribute,
    pub text_id: Uuid,
}

/// Value read from a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueText {
    pub value: Value,
    pub text_id: Uuid,
}

/// Number read from a fragment, optionally labelled by another fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleText {
    pub double: f64,
    pub text_id: Uuid,
    #[serde(default)]
    pub attribute_text_id: Option<Uuid>,
}

/// String read from a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringText {
    pub string: String,
    pub text_id: Uuid,
    #[serde(default)]
    pub attribute_text_id: Option<Uuid>,
}

/// Unit read from a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitText {
    pub unit: NutritionUnit,
    pub text_id: Uuid,
    #[serde(default)]
    pub attribute_text_id: Option<Uuid>,
}

/// Serving size spelled out inside a column header ("per serving (30 g)")
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderServing {
    pub amount: Option<f64>,
    pub unit: Option<NutritionUnit>,
    pub unit_name: Option<String>,
    pub equivalent_size: Option<HeaderEquivalentSize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderEquivalentSize {
    pub amount: Option<f64>,
    pub unit: Option<NutritionUnit>,
    pub unit_name: Option<String>,
}

/// Column header of the nutrient table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderText {
    pub header_type: HeaderType,
    pub text_id: Uuid,
    pub attribute_text_id: Uuid,
    #[serde(default)]
    pub serving: Option<HeaderServing>,
}

/// One row of the nutrient table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientRow {
    pub attribute_text: AttributeText,
    #[serde(default)]
    pub value_text1: Option<ValueText>,
    #[serde(default)]
    pub value_text2: Option<ValueText>,
}

impl NutrientRow {
    pub fn attribute(&self) -> Attribute {
        self.attribute_text.attribute
    }

    pub fn attribute_id(&self) -> Uuid {
        self.attribute_text.text_id
    }

    pub fn value1_id(&self) -> Option<Uuid> {
        self.value_text1.as_ref().map(|v| v.text_id)
    }

    pub fn value2_id(&self) -> Option<Uuid> {
        self.value_text2.as_ref().map(|v| v.text_id)
    }

    pub fn value1(&self) -> Option<Value> {
        self.value_text1.as_ref().map(|v| v.value)
    }

    pub fn value2(&self) -> Option<Value> {
        self.value_text2.as_ref().map(|v| v.value)
    }

    /// Fragment ids referenced by this row: attribute first, then values
    pub fn ids(&self) -> impl Iterator<Item = Uuid> {
        std::iter::once(self.attribute_id())
            .chain(self.value1_id())
            .chain(self.value2_id())
    }
}

/// Nutrient table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NutrientsOutput {
    #[serde(default)]
    pub header_text1: Option<HeaderText>,
    #[serde(default)]
    pub header_text2: Option<HeaderText>,
    #[serde(default)]
    pub rows: Vec<NutrientRow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquivalentSizeOutput {
    pub amount_text: Option<DoubleText>,
    pub unit_text: Option<UnitText>,
    pub unit_name_text: Option<StringText>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerContainerOutput {
    pub amount_text: Option<DoubleText>,
    pub name_text: Option<StringText>,
}

/// Serving block of the label
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServingOutput {
    #[serde(default)]
    pub amount_text: Option<DoubleText>,
    #[serde(default)]
    pub unit_text: Option<UnitText>,
    #[serde(default)]
    pub unit_name_text: Option<StringText>,
    #[serde(default)]
    pub equivalent_size: Option<EquivalentSizeOutput>,
    #[serde(default)]
    pub per_container: Option<PerContainerOutput>,
}

impl ServingOutput {
    pub fn has_any_attribute(&self) -> bool {
        self.amount_text.is_some()
            || self.unit_text.is_some()
            || self.unit_name_text.is_some()
            || self.equivalent_size.is_some()
            || self.per_container.is_some()
    }
}

/// Everything the classifier reports for one image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierOutput {
    #[serde(default)]
    pub serving: Option<ServingOutput>,
    #[serde(default)]
    pub nutrients: NutrientsOutput,
}

impl ClassifierOutput {
    /// First column header that spells out a serving size
    pub fn serving_header_text(&self) -> Option<&HeaderText> {
        [&self.nutrients.header_text1, &self.nutrients.header_text2]
            .into_iter()
            .flatten()
            .find(|h| h.serving.is_some())
    }

    pub fn contains_serving_attributes(&self) -> bool {
        self.serving
            .as_ref()
            .map(ServingOutput::has_any_attribute)
            .unwrap_or(false)
    }

    /// Whether the nutrient table has a row for `attribute`
    pub fn contains_attribute(&self, attribute: Attribute) -> bool {
        self.nutrients.rows.iter().any(|r| r.attribute() == attribute)
    }

    pub fn header1_type(&self) -> Option<HeaderType> {
        self.nutrients.header_text1.as_ref().map(|h| h.header_type)
    }

    pub fn header2_type(&self) -> Option<HeaderType> {
        self.nutrients.header_text2.as_ref().map(|h| h.header_type)
    }
}
