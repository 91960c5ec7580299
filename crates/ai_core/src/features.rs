//! Feature records and the training-time encoding
//!
//! A wire record is checked field by field so a caller sees every problem in
//! one response. The encoder then turns a valid record into the exact column
//! layout recorded in the model metadata: continuous values are copied
//! verbatim, categorical values become one-hot indicators.

use crate::errors::{CoreError, EncodingError, FieldViolation, Result};
use crate::metadata::ModelMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const WIRE_VALUES: [&'static str; 2] = ["male", "female"];

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Sex::Male),
            "female" => Some(Sex::Female),
            _ => None,
        }
    }

    /// Category spelling used in the training data
    pub fn category(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Island {
    Biscoe,
    Dream,
    Torgersen,
}

impl Island {
    pub const WIRE_VALUES: [&'static str; 3] = ["Biscoe", "Dream", "Torgersen"];

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Biscoe" => Some(Island::Biscoe),
            "Dream" => Some(Island::Dream),
            "Torgersen" => Some(Island::Torgersen),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Island::Biscoe => "Biscoe",
            Island::Dream => "Dream",
            Island::Torgersen => "Torgersen",
        }
    }
}

/// Continuous inputs, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    BillLength,
    BillDepth,
    FlipperLength,
    BodyMass,
    Year,
}

impl NumericField {
    pub const ALL: [NumericField; 5] = [
        NumericField::BillLength,
        NumericField::BillDepth,
        NumericField::FlipperLength,
        NumericField::BodyMass,
        NumericField::Year,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NumericField::BillLength => "bill_length_mm",
            NumericField::BillDepth => "bill_depth_mm",
            NumericField::FlipperLength => "flipper_length_mm",
            NumericField::BodyMass => "body_mass_g",
            NumericField::Year => "year",
        }
    }

    fn value(&self, record: &FeatureRecord) -> f64 {
        match self {
            NumericField::BillLength => record.bill_length_mm,
            NumericField::BillDepth => record.bill_depth_mm,
            NumericField::FlipperLength => record.flipper_length_mm,
            NumericField::BodyMass => record.body_mass_g,
            NumericField::Year => f64::from(record.year),
        }
    }
}

/// Categorical inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalField {
    Sex,
    Island,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 2] = [CategoricalField::Sex, CategoricalField::Island];

    pub fn name(&self) -> &'static str {
        match self {
            CategoricalField::Sex => "sex",
            CategoricalField::Island => "island",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn category(&self, record: &FeatureRecord) -> &'static str {
        match self {
            CategoricalField::Sex => record.sex.category(),
            CategoricalField::Island => record.island.category(),
        }
    }
}

/// One validated penguin measurement record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub bill_length_mm: f64,
    pub bill_depth_mm: f64,
    pub flipper_length_mm: f64,
    pub body_mass_g: f64,
    pub year: i32,
    pub sex: Sex,
    pub island: Island,
}

impl FeatureRecord {
    /// Validate a wire document, collecting every violation
    pub fn from_json(value: &Value) -> std::result::Result<Self, EncodingError> {
        let Some(object) = value.as_object() else {
            return Err(EncodingError::single(FieldViolation::InvalidType {
                field: "body".to_string(),
                expected: "a JSON object",
            }));
        };

        let mut violations = Vec::new();

        let bill_length_mm = number_field(object, "bill_length_mm", &mut violations);
        let bill_depth_mm = number_field(object, "bill_depth_mm", &mut violations);
        let flipper_length_mm = number_field(object, "flipper_length_mm", &mut violations);
        let body_mass_g = number_field(object, "body_mass_g", &mut violations);
        let year = integer_field(object, "year", &mut violations);
        let sex = enum_field(object, "sex", &Sex::WIRE_VALUES, Sex::from_wire, &mut violations);
        let island = enum_field(
            object,
            "island",
            &Island::WIRE_VALUES,
            Island::from_wire,
            &mut violations,
        );

        match (
            bill_length_mm,
            bill_depth_mm,
            flipper_length_mm,
            body_mass_g,
            year,
            sex,
            island,
        ) {
            (Some(bl), Some(bd), Some(fl), Some(bm), Some(year), Some(sex), Some(island))
                if violations.is_empty() =>
            {
                Ok(FeatureRecord {
                    bill_length_mm: bl,
                    bill_depth_mm: bd,
                    flipper_length_mm: fl,
                    body_mass_g: bm,
                    year,
                    sex,
                    island,
                })
            }
            _ => Err(EncodingError::new(violations)),
        }
    }
}

fn present<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<&'a Value> {
    match object.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::Missing {
                field: field.to_string(),
            });
            None
        }
        Some(value) => Some(value),
    }
}

fn number_field(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<f64> {
    let value = present(object, field, violations)?;
    match value.as_f64() {
        Some(v) if v.is_finite() => Some(v),
        Some(_) => {
            violations.push(FieldViolation::NonFinite {
                field: field.to_string(),
            });
            None
        }
        None => {
            violations.push(FieldViolation::InvalidType {
                field: field.to_string(),
                expected: "a number",
            });
            None
        }
    }
}

fn integer_field(
    object: &Map<String, Value>,
    field: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<i32> {
    let value = present(object, field, violations)?;

    // 2007.0 is accepted as 2007, 2007.5 is not
    let integral = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        _ => None,
    };

    match integral {
        Some(v) => match i32::try_from(v) {
            Ok(v) => Some(v),
            Err(_) => {
                violations.push(FieldViolation::OutOfRange {
                    field: field.to_string(),
                    value: v as f64,
                    min: f64::from(i32::MIN),
                    max: f64::from(i32::MAX),
                });
                None
            }
        },
        None => {
            violations.push(FieldViolation::InvalidType {
                field: field.to_string(),
                expected: "an integer",
            });
            None
        }
    }
}

fn enum_field<T>(
    object: &Map<String, Value>,
    field: &str,
    allowed: &[&str],
    parse: fn(&str) -> Option<T>,
    violations: &mut Vec<FieldViolation>,
) -> Option<T> {
    let value = present(object, field, violations)?;
    let Some(raw) = value.as_str() else {
        violations.push(FieldViolation::InvalidType {
            field: field.to_string(),
            expected: "a string",
        });
        return None;
    };

    let parsed = parse(raw);
    if parsed.is_none() {
        violations.push(FieldViolation::UnknownCategory {
            field: field.to_string(),
            value: raw.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        });
    }
    parsed
}

/// Inclusive accepted interval for one continuous field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Plausibility bounds applied before encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureBounds {
    pub bill_length_mm: Range,
    pub bill_depth_mm: Range,
    pub flipper_length_mm: Range,
    pub body_mass_g: Range,
    pub year: Range,
}

impl Default for FeatureBounds {
    fn default() -> Self {
        Self {
            bill_length_mm: Range::new(0.0, 1000.0),
            bill_depth_mm: Range::new(0.0, 1000.0),
            flipper_length_mm: Range::new(0.0, 1000.0),
            body_mass_g: Range::new(0.0, 100_000.0),
            year: Range::new(1900.0, 2100.0),
        }
    }
}

impl FeatureBounds {
    pub fn range_for(&self, field: NumericField) -> Range {
        match field {
            NumericField::BillLength => self.bill_length_mm,
            NumericField::BillDepth => self.bill_depth_mm,
            NumericField::FlipperLength => self.flipper_length_mm,
            NumericField::BodyMass => self.body_mass_g,
            NumericField::Year => self.year,
        }
    }

    /// Range-check the continuous fields of `record`
    pub fn check(&self, record: &FeatureRecord) -> std::result::Result<(), EncodingError> {
        let violations = self.violations(record);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EncodingError::new(violations))
        }
    }

    fn violations(&self, record: &FeatureRecord) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        for field in NumericField::ALL {
            let value = field.value(record);
            if !value.is_finite() {
                violations.push(FieldViolation::NonFinite {
                    field: field.name().to_string(),
                });
                continue;
            }
            let range = self.range_for(field);
            if !range.contains(value) {
                violations.push(FieldViolation::OutOfRange {
                    field: field.name().to_string(),
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        violations
    }

    pub fn validate(&self) -> Result<()> {
        for field in NumericField::ALL {
            let range = self.range_for(field);
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(CoreError::Configuration(format!(
                    "invalid bounds for {}: [{}, {}]",
                    field.name(),
                    range.min,
                    range.max
                )));
            }
        }
        Ok(())
    }
}

/// Model input in metadata column order
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVector(Vec<f64>);

impl EncodedVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for EncodedVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone)]
struct CategoricalSlot {
    field: CategoricalField,
    /// (category, indicator column); `None` is the dropped reference level
    values: Vec<(String, Option<usize>)>,
}

/// Column plan derived from the metadata, built once per loaded model
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    width: usize,
    numeric: Vec<(NumericField, usize)>,
    categorical: Vec<CategoricalSlot>,
    bounds: FeatureBounds,
}

impl FeatureEncoder {
    /// Build the plan; every metadata column must be claimed exactly once
    pub fn new(metadata: &ModelMetadata, bounds: FeatureBounds) -> Result<Self> {
        bounds.validate()?;

        let width = metadata.feature_columns.len();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(width);
        for (pos, column) in metadata.feature_columns.iter().enumerate() {
            if index.insert(column.as_str(), pos).is_some() {
                return Err(CoreError::ModelValidation(format!(
                    "duplicate feature column '{column}'"
                )));
            }
        }

        let mut claimed = vec![false; width];
        let mut claim = |pos: usize, column: &str| -> Result<()> {
            if std::mem::replace(&mut claimed[pos], true) {
                return Err(CoreError::ModelValidation(format!(
                    "feature column '{column}' is claimed twice"
                )));
            }
            Ok(())
        };

        let mut numeric = Vec::new();
        for field in NumericField::ALL {
            if let Some(&pos) = index.get(field.name()) {
                claim(pos, field.name())?;
                numeric.push((field, pos));
            }
        }

        let mut categorical = Vec::new();
        for (name, vocabulary) in &metadata.categorical_vocabulary {
            let field = CategoricalField::from_name(name).ok_or_else(|| {
                CoreError::ModelValidation(format!("vocabulary names unknown field '{name}'"))
            })?;

            let mut values = Vec::with_capacity(vocabulary.len());
            for category in vocabulary {
                let column = format!("{}_{}", field.name(), category);
                let pos = index.get(column.as_str()).copied();
                if let Some(pos) = pos {
                    claim(pos, column.as_str())?;
                }
                values.push((category.clone(), pos));
            }

            let dropped: Vec<&str> = values
                .iter()
                .filter(|(_, pos)| pos.is_none())
                .map(|(category, _)| category.as_str())
                .collect();
            if dropped.len() > 1 {
                return Err(CoreError::ModelValidation(format!(
                    "values {} of '{}' have no indicator column; at most one may be dropped",
                    dropped.join(", "),
                    field.name()
                )));
            }

            categorical.push(CategoricalSlot { field, values });
        }

        if let Some(pos) = claimed.iter().position(|c| !c) {
            return Err(CoreError::ModelValidation(format!(
                "feature column '{}' is not produced by any input field",
                metadata.feature_columns[pos]
            )));
        }

        Ok(Self {
            width,
            numeric,
            categorical,
            bounds,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Range-check and encode one record
    pub fn encode(&self, record: &FeatureRecord) -> std::result::Result<EncodedVector, EncodingError> {
        let mut violations = self.bounds.violations(record);

        let mut indicators = Vec::new();
        for slot in &self.categorical {
            let category = slot.field.category(record);
            match slot.values.iter().find(|(known, _)| known == category) {
                Some((_, Some(pos))) => indicators.push(*pos),
                Some((_, None)) => {}
                None => violations.push(FieldViolation::UnknownCategory {
                    field: slot.field.name().to_string(),
                    value: category.to_string(),
                    allowed: slot.values.iter().map(|(v, _)| v.clone()).collect(),
                }),
            }
        }

        if !violations.is_empty() {
            return Err(EncodingError::new(violations));
        }

        let mut vector = vec![0.0; self.width];
        for &(field, pos) in &self.numeric {
            vector[pos] = field.value(record);
        }
        for pos in indicators {
            vector[pos] = 1.0;
        }
        Ok(EncodedVector(vector))
    }
}

impl fmt::Display for FeatureEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} columns ({} continuous, {} categorical fields)",
            self.width,
            self.numeric.len(),
            self.categorical.len()
        )
    }
}

/// One-shot encoding against `metadata`; builds the column plan on every call
pub fn encode(
    record: &FeatureRecord,
    metadata: &ModelMetadata,
    bounds: FeatureBounds,
) -> Result<EncodedVector> {
    let encoder = FeatureEncoder::new(metadata, bounds)?;
    Ok(encoder.encode(record)?)
}
