//! Attribute vocabulary of the label classifier

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shape of the value a given attribute is expected to carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// value1 / value2 column pair (nutrients)
    ValuePair,
    /// Plain number
    Double,
    /// Free text
    String,
    /// Unit of measure, stored in the string column
    Unit,
    /// Column header type, stored in the string column
    HeaderType,
}

macro_rules! attributes {
    ($( $variant:ident => $raw:literal, $desc:literal, $shape:ident; )*) => {
        /// An attribute the classifier can report
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum Attribute {
            $( $variant, )*
        }

        impl Attribute {
            /// Every attribute in enumeration order
            pub const ALL: &'static [Attribute] = &[ $( Attribute::$variant, )* ];

            /// Identifier used in fixture tables
            pub fn raw_value(&self) -> &'static str {
                match self {
                    $( Attribute::$variant => $raw, )*
                }
            }

            /// Human readable name
            pub fn description(&self) -> &'static str {
                match self {
                    $( Attribute::$variant => $desc, )*
                }
            }

            pub fn expected_shape(&self) -> ValueShape {
                match self {
                    $( Attribute::$variant => ValueShape::$shape, )*
                }
            }
        }
    };
}

attributes! {
    ServingAmount => "servingAmount", "Serving Amount", Double;
    ServingUnit => "servingUnit", "Serving Unit", Unit;
    ServingUnitSize => "servingUnitSize", "Serving Unit Size", String;
    ServingEquivalentAmount => "servingEquivalentAmount", "Serving Equivalent Amount", Double;
    ServingEquivalentUnit => "servingEquivalentUnit", "Serving Equivalent Unit", Unit;
    ServingEquivalentUnitSize =>
        "servingEquivalentUnitSize", "Serving Equivalent Unit Size", String;
    ServingsPerContainerAmount => "servingsPerContainerAmount", "Servings Per Container", Double;
    ServingsPerContainerName => "servingsPerContainerName", "Servings Per Container Name", String;

    HeaderType1 => "headerType1", "Header 1 Type", HeaderType;
    HeaderType2 => "headerType2", "Header 2 Type", HeaderType;
    HeaderServingAmount => "headerServingAmount", "Header Serving Amount", Double;
    HeaderServingUnit => "headerServingUnit", "Header Serving Unit", Unit;
    HeaderServingUnitSize => "headerServingUnitSize", "Header Serving Unit Size", String;
    HeaderServingEquivalentAmount =>
        "headerServingEquivalentAmount", "Header Serving Equivalent Amount", Double;
    HeaderServingEquivalentUnit =>
        "headerServingEquivalentUnit", "Header Serving Equivalent Unit", Unit;
    HeaderServingEquivalentUnitSize =>
        "headerServingEquivalentUnitSize", "Header Serving Equivalent Unit Size", String;

    Energy => "energy", "Energy", ValuePair;
    Calories => "calories", "Calories", ValuePair;
    Protein => "protein", "Protein", ValuePair;
    Carbohydrate => "carbohydrate", "Carbohydrate", ValuePair;
    DietaryFibre => "dietaryFibre", "Dietary Fibre", ValuePair;
    Sugar => "sugar", "Sugar", ValuePair;
    AddedSugar => "addedSugar", "Added Sugar", ValuePair;
    Fat => "fat", "Fat", ValuePair;
    SaturatedFat => "saturatedFat", "Saturated Fat", ValuePair;
    TransFat => "transFat", "Trans Fat", ValuePair;
    PolyunsaturatedFat => "polyunsaturatedFat", "Polyunsaturated Fat", ValuePair;
    MonounsaturatedFat => "monounsaturatedFat", "Monounsaturated Fat", ValuePair;
    Cholesterol => "cholesterol", "Cholesterol", ValuePair;
    Sodium => "sodium", "Sodium", ValuePair;
    Salt => "salt", "Salt", ValuePair;
    Calcium => "calcium", "Calcium", ValuePair;
    Iron => "iron", "Iron", ValuePair;
    Potassium => "potassium", "Potassium", ValuePair;
    VitaminA => "vitaminA", "Vitamin A", ValuePair;
    VitaminC => "vitaminC", "Vitamin C", ValuePair;
    VitaminD => "vitaminD", "Vitamin D", ValuePair;
}

impl Attribute {
    pub fn is_serving_attribute(&self) -> bool {
        matches!(
            self,
            Attribute::ServingAmount
                | Attribute::ServingUnit
                | Attribute::ServingUnitSize
                | Attribute::ServingEquivalentAmount
                | Attribute::ServingEquivalentUnit
                | Attribute::ServingEquivalentUnitSize
                | Attribute::ServingsPerContainerAmount
                | Attribute::ServingsPerContainerName
        )
    }

    pub fn is_header_attribute(&self) -> bool {
        matches!(
            self,
            Attribute::HeaderType1
                | Attribute::HeaderType2
                | Attribute::HeaderServingAmount
                | Attribute::HeaderServingUnit
                | Attribute::HeaderServingUnitSize
                | Attribute::HeaderServingEquivalentAmount
                | Attribute::HeaderServingEquivalentUnit
                | Attribute::HeaderServingEquivalentUnitSize
        )
    }

    pub fn is_nutrient_attribute(&self) -> bool {
        self.expected_shape() == ValueShape::ValuePair
    }

    /// Serving and header attributes, in enumeration order
    pub fn non_nutrient_observations() -> impl Iterator<Item = Attribute> {
        Attribute::ALL
            .iter()
            .copied()
            .filter(|a| a.is_serving_attribute() || a.is_header_attribute())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_value())
    }
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .iter()
            .copied()
            .find(|a| a.raw_value() == s)
            .ok_or_else(|| format!("unknown attribute `{}`", s))
    }
}

/// Unit of measure on a nutrition label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutritionUnit {
    Mcg,
    Mg,
    G,
    Kj,
    Kcal,
    Ml,
    #[serde(rename = "%")]
    Percent,
    Cup,
    Tbsp,
    Tsp,
}

impl NutritionUnit {
    pub const ALL: [NutritionUnit; 10] = [
        NutritionUnit::Mcg,
        NutritionUnit::Mg,
        NutritionUnit::G,
        NutritionUnit::Kj,
        NutritionUnit::Kcal,
        NutritionUnit::Ml,
        NutritionUnit::Percent,
        NutritionUnit::Cup,
        NutritionUnit::Tbsp,
        NutritionUnit::Tsp,
    ];

    pub fn raw_value(&self) -> &'static str {
        match self {
            NutritionUnit::Mcg => "mcg",
            NutritionUnit::Mg => "mg",
            NutritionUnit::G => "g",
            NutritionUnit::Kj => "kj",
            NutritionUnit::Kcal => "kcal",
            NutritionUnit::Ml => "ml",
            NutritionUnit::Percent => "%",
            NutritionUnit::Cup => "cup",
            NutritionUnit::Tbsp => "tbsp",
            NutritionUnit::Tsp => "tsp",
        }
    }
}

impl fmt::Display for NutritionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_value())
    }
}

impl FromStr for NutritionUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        NutritionUnit::ALL
            .iter()
            .copied()
            .find(|u| u.raw_value() == lower)
            .ok_or_else(|| format!("unknown unit `{}`", s))
    }
}

/// Type of a nutrient table column header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderType {
    Per100g,
    Per100ml,
    PerServing,
}

impl HeaderType {
    pub const ALL: [HeaderType; 3] = [
        HeaderType::Per100g,
        HeaderType::Per100ml,
        HeaderType::PerServing,
    ];

    pub fn raw_value(&self) -> &'static str {
        match self {
            HeaderType::Per100g => "per100g",
            HeaderType::Per100ml => "per100ml",
            HeaderType::PerServing => "perServing",
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_value())
    }
}

impl FromStr for HeaderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeaderType::ALL
            .iter()
            .copied()
            .find(|h| h.raw_value() == s.trim())
            .ok_or_else(|| format!("unknown header type `{}`", s))
    }
}

/// Amount with an optional unit, e.g. `5.2 g`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub amount: f64,
    pub unit: Option<NutritionUnit>,
}

impl Value {
    pub fn new(amount: f64, unit: Option<NutritionUnit>) -> Self {
        Self { amount, unit }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{} {}", self.amount, unit),
            None => write!(f, "{}", self.amount),
        }
    }
}

impl FromStr for Value {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let amount = number
            .parse::<f64>()
            .map_err(|_| format!("invalid value `{}`", s))?;
        let unit = unit.trim();
        let unit = if unit.is_empty() {
            None
        } else {
            Some(unit.parse::<NutritionUnit>()?)
        };
        Ok(Value { amount, unit })
    }
}
