//! Attribute rows of a fixture entry
//!
//! Each row carries exactly one value shape. Missing columns are written as
//! `nil` so that absence survives a round trip. A present value that would
//! read as the marker (or starts with the escape) gets a leading `\`.

use std::io::{Read, Write};
use tracing::{debug, warn};

use super::FixtureError;
use crate::classify::{Attribute, HeaderType, NutritionUnit, Value, ValueShape};
use crate::session::{AttributeValue, ExpectationStore, Observation, RegionSet, Status};

/// Column header of expectation tables
pub const ROW_HEADER: [&str; 5] = [
    "attributeString",
    "value1String",
    "value2String",
    "double",
    "string",
];

/// Marker for an absent column
pub const ABSENT: &str = "nil";

const ESCAPE: char = '\\';

fn write_column(column: &Option<String>) -> std::borrow::Cow<'_, str> {
    match column.as_deref() {
        None => ABSENT.into(),
        Some(value) if value == ABSENT || value.starts_with(ESCAPE) => {
            format!("{}{}", ESCAPE, value).into()
        }
        Some(value) => value.into(),
    }
}

fn read_column(raw: Option<&str>) -> Option<String> {
    match raw {
        None | Some(ABSENT) => None,
        Some(value) => Some(value.strip_prefix(ESCAPE).unwrap_or(value).to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRow {
    pub attribute: String,
    pub value1: Option<String>,
    pub value2: Option<String>,
    pub double: Option<String>,
    pub string: Option<String>,
}

impl FixtureRow {
    pub fn new(attribute: Attribute, value: &AttributeValue) -> Self {
        let mut row = Self {
            attribute: attribute.raw_value().to_string(),
            value1: None,
            value2: None,
            double: None,
            string: None,
        };
        match value {
            AttributeValue::Values { value1, value2 } => {
                row.value1 = value1.map(|v| v.to_string());
                row.value2 = value2.map(|v| v.to_string());
            }
            AttributeValue::Double(d) => row.double = Some(d.to_string()),
            AttributeValue::String(s) => row.string = Some(s.clone()),
            AttributeValue::Unit(u) => row.string = Some(u.raw_value().to_string()),
            AttributeValue::Header(h) => row.string = Some(h.raw_value().to_string()),
        }
        row
    }

    /// Parse the row back into a typed attribute value
    pub fn decode(&self) -> Result<(Attribute, AttributeValue), FixtureError> {
        let attribute: Attribute = self
            .attribute
            .parse()
            .map_err(|reason| self.invalid(reason))?;

        let value = match attribute.expected_shape() {
            ValueShape::ValuePair => AttributeValue::Values {
                value1: self.parse_optional::<Value>(&self.value1)?,
                value2: self.parse_optional::<Value>(&self.value2)?,
            },
            ValueShape::Double => {
                let raw = self.required(&self.double, "double")?;
                AttributeValue::Double(
                    raw.parse()
                        .map_err(|_| self.invalid(format!("`{}` is not a number", raw)))?,
                )
            }
            ValueShape::String => {
                AttributeValue::String(self.required(&self.string, "string")?.to_string())
            }
            ValueShape::Unit => {
                let raw = self.required(&self.string, "string")?;
                let unit = raw.parse::<NutritionUnit>().map_err(|reason| self.invalid(reason))?;
                AttributeValue::Unit(unit)
            }
            ValueShape::HeaderType => {
                let raw = self.required(&self.string, "string")?;
                let header = raw.parse::<HeaderType>().map_err(|reason| self.invalid(reason))?;
                AttributeValue::Header(header)
            }
        };
        Ok((attribute, value))
    }

    fn parse_optional<T>(&self, column: &Option<String>) -> Result<Option<T>, FixtureError>
    where
        T: std::str::FromStr<Err = String>,
    {
        column
            .as_deref()
            .map(|raw| raw.parse::<T>().map_err(|reason| self.invalid(reason)))
            .transpose()
    }

    fn required<'a>(
        &self,
        column: &'a Option<String>,
        name: &str,
    ) -> Result<&'a str, FixtureError> {
        column
            .as_deref()
            .ok_or_else(|| self.invalid(format!("missing `{}` column", name)))
    }

    fn invalid(&self, reason: impl Into<String>) -> FixtureError {
        FixtureError::InvalidRow {
            attribute: self.attribute.clone(),
            reason: reason.into(),
        }
    }
}

/// Encode the reviewed state of a session into attribute rows.
///
/// Per attribute, in enumeration order, the first available source wins:
/// every `Valid` observation of it (one row each), then its expectation, then
/// a region's expected override. Sources are never mixed for one attribute.
pub fn encode(
    regions: &RegionSet,
    observations: &[Observation],
    expectations: &ExpectationStore,
) -> Vec<FixtureRow> {
    let mut rows = Vec::new();

    for &attribute in Attribute::ALL {
        let before = rows.len();
        rows.extend(
            observations
                .iter()
                .filter(|o| o.attribute == attribute && o.status == Status::Valid)
                .map(|o| FixtureRow::new(attribute, &o.value)),
        );
        if rows.len() > before {
            continue;
        }

        if let Some(expectation) = expectations.get(attribute) {
            rows.push(FixtureRow::new(attribute, &expectation.value));
        } else if let Some(value) = region_override(regions, attribute) {
            rows.push(FixtureRow::new(attribute, &value));
        }
    }

    debug!(
        "Encoded {} rows from {} observations and {} expectations",
        rows.len(),
        observations.len(),
        expectations.len()
    );
    rows
}

fn region_override(regions: &RegionSet, attribute: Attribute) -> Option<AttributeValue> {
    let expected = regions
        .iter()
        .filter_map(|r| r.expected.as_ref())
        .find(|e| e.attribute == Some(attribute))?;

    if attribute.expected_shape() != ValueShape::ValuePair {
        warn!("Ignoring region override for non-nutrient attribute `{}`", attribute);
        return None;
    }
    Some(AttributeValue::Values {
        value1: expected.value1,
        value2: expected.value2,
    })
}

/// Write rows as CSV with a header line
pub fn write_rows<W: Write>(writer: W, rows: &[FixtureRow]) -> Result<(), FixtureError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(ROW_HEADER)?;
    for row in rows {
        wtr.write_record([
            row.attribute.as_str(),
            &*write_column(&row.value1),
            &*write_column(&row.value2),
            &*write_column(&row.double),
            &*write_column(&row.string),
        ])?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<FixtureRow>, FixtureError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for record in rdr.records() {
        let record = record?;
        let column = |i: usize| read_column(record.get(i));
        rows.push(FixtureRow {
            attribute: record.get(0).unwrap_or_default().to_string(),
            value1: column(1),
            value2: column(2),
            double: column(3),
            string: column(4),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Expectation, ExpectedOverride, Region};
    use crate::vision::{PassKind, Rect, TextFragment};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn observation(attribute: Attribute, value: AttributeValue, status: Status) -> Observation {
        Observation {
            attribute,
            source_fragment_ids: vec![Uuid::new_v4()],
            value,
            status,
        }
    }

    fn pair(value1: Option<Value>, value2: Option<Value>) -> AttributeValue {
        AttributeValue::Values { value1, value2 }
    }

    fn encode_and_read(rows: &[FixtureRow]) -> Vec<FixtureRow> {
        let mut buffer = Vec::new();
        write_rows(&mut buffer, rows).unwrap();
        read_rows(buffer.as_slice()).unwrap()
    }

    #[test]
    fn test_valid_observation_round_trip_keeps_absence() {
        let sugar = pair(Some(Value::new(5.2, Some(NutritionUnit::G))), None);
        let observations = vec![observation(Attribute::Sugar, sugar.clone(), Status::Valid)];

        let rows = encode(&RegionSet::new(), &observations, &ExpectationStore::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value1.as_deref(), Some("5.2 g"));
        assert_eq!(rows[0].value2, None);

        let read = encode_and_read(&rows);
        assert_eq!(read, rows);
        assert_eq!(read[0].decode().unwrap(), (Attribute::Sugar, sugar));
    }

    #[test]
    fn test_absent_columns_written_as_marker() {
        let row = FixtureRow::new(Attribute::ServingAmount, &AttributeValue::Double(30.0));
        let mut buffer = Vec::new();
        write_rows(&mut buffer, &[row]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "attributeString,value1String,value2String,double,string\nservingAmount,nil,nil,30,nil\n"
        );
    }

    #[test]
    fn test_expectation_overrides_invalid_observation() {
        let observations = vec![observation(
            Attribute::Sodium,
            pair(Some(Value::new(12.0, Some(NutritionUnit::Mg))), None),
            Status::Invalid,
        )];
        let mut expectations = ExpectationStore::new();
        let expected = pair(Some(Value::new(120.0, Some(NutritionUnit::Mg))), None);
        expectations
            .add(Expectation::new(Attribute::Sodium, expected.clone()))
            .unwrap();

        let rows = encode(&RegionSet::new(), &observations, &expectations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value1.as_deref(), Some("120 mg"));
        assert_eq!(rows[0].decode().unwrap(), (Attribute::Sodium, expected));
    }

    #[test]
    fn test_valid_observation_wins_over_expectation() {
        let observed = pair(Some(Value::new(3.0, Some(NutritionUnit::G))), None);
        let observations = vec![observation(Attribute::Fat, observed.clone(), Status::Valid)];
        let mut expectations = ExpectationStore::new();
        expectations
            .add(Expectation::new(
                Attribute::Fat,
                pair(Some(Value::new(4.0, Some(NutritionUnit::G))), None),
            ))
            .unwrap();

        let rows = encode(&RegionSet::new(), &observations, &expectations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decode().unwrap().1, observed);
    }

    #[test]
    fn test_every_valid_row_of_an_attribute_is_exported() {
        let kj = pair(Some(Value::new(1000.0, Some(NutritionUnit::Kj))), None);
        let kcal = pair(Some(Value::new(240.0, Some(NutritionUnit::Kcal))), None);
        let observations = vec![
            observation(Attribute::Energy, kj.clone(), Status::Valid),
            observation(Attribute::Energy, kcal.clone(), Status::Valid),
        ];

        let rows = encode(&RegionSet::new(), &observations, &ExpectationStore::new());
        let decoded: Vec<_> = rows.iter().map(|r| r.decode().unwrap()).collect();
        assert_eq!(
            decoded,
            vec![(Attribute::Energy, kj), (Attribute::Energy, kcal)]
        );
    }

    #[test]
    fn test_expectation_replaces_invalid_rows_only() {
        let kj = pair(Some(Value::new(1000.0, Some(NutritionUnit::Kj))), None);
        let expected = pair(Some(Value::new(250.0, Some(NutritionUnit::Kcal))), None);
        let mut expectations = ExpectationStore::new();
        expectations
            .add(Expectation::new(Attribute::Energy, expected.clone()))
            .unwrap();

        let invalid = vec![
            observation(Attribute::Energy, kj.clone(), Status::Invalid),
            observation(Attribute::Energy, kj.clone(), Status::Invalid),
        ];
        let rows = encode(&RegionSet::new(), &invalid, &expectations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decode().unwrap(), (Attribute::Energy, expected));
    }

    #[test]
    fn test_literal_marker_text_round_trips() {
        let literal = AttributeValue::String(ABSENT.to_string());
        let escaped = AttributeValue::String("\\nil".to_string());
        let rows = vec![
            FixtureRow::new(Attribute::ServingUnitSize, &literal),
            FixtureRow::new(Attribute::HeaderServingUnitSize, &escaped),
        ];

        let mut buffer = Vec::new();
        write_rows(&mut buffer, &rows).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.contains("servingUnitSize,nil,nil,nil,\\nil\n"));

        let read = read_rows(buffer.as_slice()).unwrap();
        assert_eq!(read, rows);
        assert_eq!(read[0].decode().unwrap(), (Attribute::ServingUnitSize, literal));
        assert_eq!(
            read[1].decode().unwrap(),
            (Attribute::HeaderServingUnitSize, escaped)
        );
    }

    #[test]
    fn test_unmarked_observation_is_not_exported() {
        let observations = vec![observation(
            Attribute::Protein,
            pair(None, None),
            Status::Unmarked,
        )];
        assert!(encode(&RegionSet::new(), &observations, &ExpectationStore::new()).is_empty());
    }

    #[test]
    fn test_region_override_is_lowest_priority() {
        let fragment = TextFragment {
            id: Uuid::new_v4(),
            pass: PassKind::WithCorrection,
            text: "Iron 2mg".to_string(),
            normalized_box: Rect::new(0.0, 0.0, 0.5, 0.5),
            content_rect: Rect::new(0.0, 0.0, 5.0, 5.0),
        };
        let mut region = Region::from_fragment(fragment);
        region.expected = Some(ExpectedOverride {
            attribute: Some(Attribute::Iron),
            value1: Some(Value::new(2.0, Some(NutritionUnit::Mg))),
            value2: None,
        });
        let mut regions = RegionSet::new();
        regions.push(region);

        let rows = encode(&regions, &[], &ExpectationStore::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attribute, "iron");
        assert_eq!(rows[0].value1.as_deref(), Some("2 mg"));
    }

    #[test]
    fn test_unit_and_header_use_string_column() {
        let unit = FixtureRow::new(
            Attribute::ServingUnit,
            &AttributeValue::Unit(NutritionUnit::Ml),
        );
        assert_eq!(unit.string.as_deref(), Some("ml"));
        let header = FixtureRow::new(
            Attribute::HeaderType1,
            &AttributeValue::Header(HeaderType::Per100g),
        );
        assert_eq!(header.string.as_deref(), Some("per100g"));
        assert_eq!(
            header.decode().unwrap(),
            (Attribute::HeaderType1, AttributeValue::Header(HeaderType::Per100g))
        );
    }

    #[test]
    fn test_decode_rejects_bad_rows() {
        let row = FixtureRow {
            attribute: "servingAmount".to_string(),
            value1: None,
            value2: None,
            double: None,
            string: None,
        };
        assert!(matches!(row.decode(), Err(FixtureError::InvalidRow { .. })));

        let row = FixtureRow {
            attribute: "notAnAttribute".to_string(),
            ..row
        };
        assert!(matches!(row.decode(), Err(FixtureError::InvalidRow { .. })));
    }
}
