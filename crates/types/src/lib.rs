use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use enumset::EnumSetType;
use serde::{Deserialize, Serialize};

/// Opaque identifier naming one device register, e.g. `"7101"`.
///
/// Keys carry no meaning of their own; the data-point schema assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataPointKey(Cow<'static, str>);

impl DataPointKey {
    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric register address, when the key is one.
    pub fn address(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for DataPointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for DataPointKey {
    fn from(key: &'static str) -> Self {
        Self::from_static(key)
    }
}

/// A data-point value after ingestion normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl RawValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Decimal(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Decimal(value) => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// The full cached view of every polled data point at one point in time.
///
/// A snapshot is never mutated after construction. An absent key means the
/// value is unknown, which is distinct from a key present with value 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    values: HashMap<DataPointKey, RawValue>,
    collected_at_ms: u64,
}

impl DeviceSnapshot {
    pub fn new(values: HashMap<DataPointKey, RawValue>, collected_at_ms: u64) -> Self {
        Self {
            values,
            collected_at_ms,
        }
    }

    pub fn get(&self, key: &DataPointKey) -> Option<&RawValue> {
        self.values.get(key)
    }

    pub fn integer(&self, key: &DataPointKey) -> Option<i64> {
        self.get(key).and_then(RawValue::as_i64)
    }

    pub fn contains(&self, key: &DataPointKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataPointKey, &RawValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn collected_at_ms(&self) -> u64 {
        self.collected_at_ms
    }
}

impl FromIterator<(DataPointKey, RawValue)> for DeviceSnapshot {
    fn from_iter<I: IntoIterator<Item = (DataPointKey, RawValue)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect(), 0)
    }
}

/// Payload of a single-point write. Some keys take a multi-element payload,
/// e.g. the battery control triplet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WriteValue {
    Single(i64),
    Multi(Vec<i64>),
}

impl WriteValue {
    pub fn to_vec(&self) -> Vec<i64> {
        match self {
            Self::Single(value) => vec![*value],
            Self::Multi(values) => values.clone(),
        }
    }
}

impl fmt::Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{value}"),
            Self::Multi(values) => write!(f, "{values:?}"),
        }
    }
}

impl From<i64> for WriteValue {
    fn from(value: i64) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<i64>> for WriteValue {
    fn from(values: Vec<i64>) -> Self {
        Self::Multi(values)
    }
}

impl<const N: usize> From<[i64; N]> for WriteValue {
    fn from(values: [i64; N]) -> Self {
        Self::Multi(values.to_vec())
    }
}

const GEN1_MODEL: &str = "BK1600/BK1600Ultra";

/// Hardware/firmware variant of the device family.
#[derive(Debug, Hash, EnumSetType)]
pub enum Generation {
    Gen1,
    Gen2,
}

impl Generation {
    /// Only the BK1600 family is first generation; every other model is second.
    pub fn from_model(model: &str) -> Self {
        if model.trim() == GEN1_MODEL {
            Self::Gen1
        } else {
            Self::Gen2
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Gen1),
            2 => Some(Self::Gen2),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::Gen1 => 1,
            Self::Gen2 => 2,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Static facts about one configured device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub host: String,
    pub model: String,
    pub generation: Generation,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, host: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: id.into(),
            host: host.into(),
            generation: Generation::from_model(&model),
            model,
        }
    }

    pub fn display_name(&self) -> String {
        format!("Indevolt {}", self.model)
    }
}
