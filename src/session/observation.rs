//! Observations: attribute-level facts flattened from classifier output
//!
//! Non-nutrient attributes (serving, then header-derived) come first in
//! enumeration order, followed by nutrient rows in classifier order.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::region::Status;
use crate::classify::{
    Attribute, ClassifierOutput, DoubleText, HeaderText, HeaderType, NutrientRow, NutritionUnit,
    StringText, UnitText, Value, ValueShape,
};

/// Value carried by an observation or expectation. Exactly one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Values {
        value1: Option<Value>,
        value2: Option<Value>,
    },
    Double(f64),
    String(String),
    Unit(NutritionUnit),
    Header(HeaderType),
}

impl AttributeValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            AttributeValue::Values { .. } => ValueShape::ValuePair,
            AttributeValue::Double(_) => ValueShape::Double,
            AttributeValue::String(_) => ValueShape::String,
            AttributeValue::Unit(_) => ValueShape::Unit,
            AttributeValue::Header(_) => ValueShape::HeaderType,
        }
    }

    pub fn value1(&self) -> Option<Value> {
        match self {
            AttributeValue::Values { value1, .. } => *value1,
            _ => None,
        }
    }

    pub fn value2(&self) -> Option<Value> {
        match self {
            AttributeValue::Values { value2, .. } => *value2,
            _ => None,
        }
    }

    pub fn double(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<NutritionUnit> {
        match self {
            AttributeValue::Unit(u) => Some(*u),
            _ => None,
        }
    }

    pub fn header_type(&self) -> Option<HeaderType> {
        match self {
            AttributeValue::Header(h) => Some(*h),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AttributeValue::Values { value1, value2 } => match (value1, value2) {
                (Some(v1), Some(v2)) => format!("{} • {}", v1, v2),
                (None, Some(v2)) => format!("(nil) • {}", v2),
                (Some(v1), None) => v1.to_string(),
                (None, None) => String::new(),
            },
            AttributeValue::Double(d) => d.to_string(),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Unit(u) => u.to_string(),
            AttributeValue::Header(h) => h.to_string(),
        };
        f.pad(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub attribute: Attribute,
    /// Ids of every fragment that justifies this observation
    pub source_fragment_ids: Vec<Uuid>,
    pub value: AttributeValue,
    #[serde(default)]
    pub status: Status,
}

impl Observation {
    fn new(
        attribute: Attribute,
        value: AttributeValue,
        ids: impl IntoIterator<Item = Option<Uuid>>,
    ) -> Self {
        let mut source_fragment_ids = Vec::new();
        for id in ids.into_iter().flatten() {
            if !source_fragment_ids.contains(&id) {
                source_fragment_ids.push(id);
            }
        }
        Self {
            attribute,
            source_fragment_ids,
            value,
            status: Status::Unmarked,
        }
    }

    fn from_double(attribute: Attribute, text: &DoubleText) -> Self {
        Self::new(
            attribute,
            AttributeValue::Double(text.double),
            [Some(text.text_id), text.attribute_text_id],
        )
    }

    fn from_unit(attribute: Attribute, text: &UnitText) -> Self {
        Self::new(
            attribute,
            AttributeValue::Unit(text.unit),
            [Some(text.text_id), text.attribute_text_id],
        )
    }

    fn from_string(attribute: Attribute, text: &StringText) -> Self {
        Self::new(
            attribute,
            AttributeValue::String(text.string.clone()),
            [Some(text.text_id), text.attribute_text_id],
        )
    }

    fn from_header(attribute: Attribute, header: &HeaderText) -> Self {
        Self::new(
            attribute,
            AttributeValue::Header(header.header_type),
            [Some(header.text_id), Some(header.attribute_text_id)],
        )
    }

    /// Value read out of a column header; traced to the header's own fragments
    fn from_header_serving(
        attribute: Attribute,
        header: &HeaderText,
        value: AttributeValue,
    ) -> Self {
        Self::new(attribute, value, [Some(header.text_id), Some(header.attribute_text_id)])
    }

    fn from_nutrient_row(row: &NutrientRow) -> Self {
        Self::new(
            row.attribute(),
            AttributeValue::Values {
                value1: row.value1(),
                value2: row.value2(),
            },
            [Some(row.attribute_id()), row.value1_id(), row.value2_id()],
        )
    }
}

/// Flatten classifier output into observations
pub fn build_observations(output: &ClassifierOutput) -> Vec<Observation> {
    let mut observations: Vec<Observation> = Attribute::non_nutrient_observations()
        .filter_map(|attribute| observation_for(output, attribute))
        .collect();

    observations.extend(output.nutrients.rows.iter().map(Observation::from_nutrient_row));
    observations
}

fn observation_for(output: &ClassifierOutput, attribute: Attribute) -> Option<Observation> {
    let serving = output.serving.as_ref();
    let equivalent = serving.and_then(|s| s.equivalent_size.as_ref());
    let per_container = serving.and_then(|s| s.per_container.as_ref());

    match attribute {
        Attribute::ServingAmount => serving?
            .amount_text
            .as_ref()
            .map(|t| Observation::from_double(attribute, t)),
        Attribute::ServingUnit => serving?
            .unit_text
            .as_ref()
            .map(|t| Observation::from_unit(attribute, t)),
        Attribute::ServingUnitSize => serving?
            .unit_name_text
            .as_ref()
            .map(|t| Observation::from_string(attribute, t)),
        Attribute::ServingEquivalentAmount => equivalent?
            .amount_text
            .as_ref()
            .map(|t| Observation::from_double(attribute, t)),
        Attribute::ServingEquivalentUnit => equivalent?
            .unit_text
            .as_ref()
            .map(|t| Observation::from_unit(attribute, t)),
        Attribute::ServingEquivalentUnitSize => equivalent?
            .unit_name_text
            .as_ref()
            .map(|t| Observation::from_string(attribute, t)),
        Attribute::ServingsPerContainerAmount => per_container?
            .amount_text
            .as_ref()
            .map(|t| Observation::from_double(attribute, t)),
        Attribute::ServingsPerContainerName => per_container?
            .name_text
            .as_ref()
            .map(|t| Observation::from_string(attribute, t)),
        Attribute::HeaderType1 => output
            .nutrients
            .header_text1
            .as_ref()
            .map(|h| Observation::from_header(attribute, h)),
        Attribute::HeaderType2 => output
            .nutrients
            .header_text2
            .as_ref()
            .map(|h| Observation::from_header(attribute, h)),
        Attribute::HeaderServingAmount
        | Attribute::HeaderServingUnit
        | Attribute::HeaderServingUnitSize
        | Attribute::HeaderServingEquivalentAmount
        | Attribute::HeaderServingEquivalentUnit
        | Attribute::HeaderServingEquivalentUnitSize => {
            header_serving_observation(output, attribute)
        }
        _ => None,
    }
}

fn header_serving_observation(
    output: &ClassifierOutput,
    attribute: Attribute,
) -> Option<Observation> {
    let header = output.serving_header_text()?;
    let serving = header.serving.as_ref()?;
    let equivalent = serving.equivalent_size.as_ref();

    let value = match attribute {
        Attribute::HeaderServingAmount => AttributeValue::Double(serving.amount?),
        Attribute::HeaderServingUnit => AttributeValue::Unit(serving.unit?),
        Attribute::HeaderServingUnitSize => AttributeValue::String(serving.unit_name.clone()?),
        Attribute::HeaderServingEquivalentAmount => AttributeValue::Double(equivalent?.amount?),
        Attribute::HeaderServingEquivalentUnit => AttributeValue::Unit(equivalent?.unit?),
        Attribute::HeaderServingEquivalentUnitSize => {
            AttributeValue::String(equivalent?.unit_name.clone()?)
        }
        _ => return None,
    };
    Some(Observation::from_header_serving(attribute, header, value))
}
