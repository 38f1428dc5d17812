use std::collections::{BTreeSet, HashMap};
use std::fmt;

use enumset::{enum_set, EnumSet};
use serde_json::Value;
use tracing::{debug, warn};

use types::{DataPointKey, DeviceSnapshot, Generation, RawValue};

mod modes;
mod tables;

pub use modes::{
    PowerLimits, UnknownModeName, WorkingMode, BATTERY_CONTROL_KEY, DISCHARGE_LIMIT_READ_KEY, WORKING_MODE_READ_KEY,
    WORKING_MODE_WRITE_KEY,
};
pub use tables::{NUMBERS, SELECTS, SENSORS_GEN1, SENSORS_GEN2, SWITCHES};

pub const ALL_GENERATIONS: EnumSet<Generation> = enum_set!(Generation::Gen1 | Generation::Gen2);
pub const GEN1_ONLY: EnumSet<Generation> = enum_set!(Generation::Gen1);
pub const GEN2_ONLY: EnumSet<Generation> = enum_set!(Generation::Gen2);

/// How a data point travels over the wire. Values are normalized once, at
/// snapshot ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEncoding {
    /// JSON integer, or a string holding one.
    Integer,
    /// Any JSON number, or a string holding one.
    Decimal,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Watt,
    WattHour,
    KilowattHour,
    Percent,
    Volt,
    Ampere,
    Hertz,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Watt => "W",
            Self::WattHour => "Wh",
            Self::KilowattHour => "kWh",
            Self::Percent => "%",
            Self::Volt => "V",
            Self::Ampere => "A",
            Self::Hertz => "Hz",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityKind {
    Sensor,
    Number { min: f64, max: f64, step: f64 },
    Select,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueTransform {
    Linear { coefficient: f64 },
    Mapping(&'static [(i64, &'static str)]),
    /// Reads as on when the raw value equals `on`; writes `write_on`/`write_off`.
    Toggle { on: i64, write_on: i64, write_off: i64 },
    Text,
}

/// Static definition of one exposed capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: EntityKind,
    read_key: &'static str,
    write_key: Option<&'static str>,
    pub generations: EnumSet<Generation>,
    pub encoding: RawEncoding,
    pub transform: ValueTransform,
    pub unit: Option<Unit>,
    pub diagnostic: bool,
}

impl EntityDescriptor {
    const fn base(id: &'static str, name: &'static str, read_key: &'static str) -> Self {
        Self {
            id,
            name,
            kind: EntityKind::Sensor,
            read_key,
            write_key: None,
            generations: ALL_GENERATIONS,
            encoding: RawEncoding::Decimal,
            transform: ValueTransform::Linear { coefficient: 1.0 },
            unit: None,
            diagnostic: false,
        }
    }

    pub const fn sensor(id: &'static str, name: &'static str, read_key: &'static str, unit: Unit) -> Self {
        Self {
            unit: Some(unit),
            ..Self::base(id, name, read_key)
        }
    }

    pub const fn enumeration(
        id: &'static str,
        name: &'static str,
        read_key: &'static str,
        mapping: &'static [(i64, &'static str)],
    ) -> Self {
        Self {
            encoding: RawEncoding::Integer,
            transform: ValueTransform::Mapping(mapping),
            ..Self::base(id, name, read_key)
        }
    }

    pub const fn text(id: &'static str, name: &'static str, read_key: &'static str) -> Self {
        Self {
            encoding: RawEncoding::Text,
            transform: ValueTransform::Text,
            diagnostic: true,
            ..Self::base(id, name, read_key)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub const fn number(
        id: &'static str,
        name: &'static str,
        read_key: &'static str,
        write_key: &'static str,
        unit: Unit,
        min: f64,
        max: f64,
        step: f64,
    ) -> Self {
        Self {
            kind: EntityKind::Number { min, max, step },
            write_key: Some(write_key),
            unit: Some(unit),
            ..Self::base(id, name, read_key)
        }
    }

    pub const fn select(
        id: &'static str,
        name: &'static str,
        read_key: &'static str,
        write_key: &'static str,
        mapping: &'static [(i64, &'static str)],
    ) -> Self {
        Self {
            kind: EntityKind::Select,
            write_key: Some(write_key),
            ..Self::enumeration(id, name, read_key, mapping)
        }
    }

    pub const fn switch(
        id: &'static str,
        name: &'static str,
        read_key: &'static str,
        write_key: &'static str,
        on: i64,
    ) -> Self {
        Self {
            kind: EntityKind::Switch,
            write_key: Some(write_key),
            encoding: RawEncoding::Integer,
            transform: ValueTransform::Toggle {
                on,
                write_on: 1,
                write_off: 0,
            },
            ..Self::base(id, name, read_key)
        }
    }

    pub const fn only(self, generations: EnumSet<Generation>) -> Self {
        Self {
            generations,
            ..self
        }
    }

    pub const fn scaled(self, coefficient: f64) -> Self {
        Self {
            transform: ValueTransform::Linear { coefficient },
            ..self
        }
    }

    pub fn read_key(&self) -> DataPointKey {
        DataPointKey::from_static(self.read_key)
    }

    pub fn write_key(&self) -> Option<DataPointKey> {
        self.write_key.map(DataPointKey::from_static)
    }

    pub fn applies_to(&self, generation: Generation) -> bool {
        self.generations.contains(generation)
    }

    /// Options offered by a select or enumeration, in table order.
    pub fn options(&self) -> Vec<&'static str> {
        match self.transform {
            ValueTransform::Mapping(mapping) => mapping.iter().map(|(_, label)| *label).collect(),
            _ => Vec::new(),
        }
    }

    /// Raw code for a mapping label.
    pub fn code_for(&self, label: &str) -> Option<i64> {
        match self.transform {
            ValueTransform::Mapping(mapping) => mapping
                .iter()
                .find(|(_, candidate)| *candidate == label)
                .map(|(code, _)| *code),
            _ => None,
        }
    }

    /// Projects the snapshot value of this descriptor's read key.
    pub fn project(&self, snapshot: Option<&DeviceSnapshot>) -> EntityState {
        let Some(raw) = snapshot.and_then(|snapshot| snapshot.get(&self.read_key())) else {
            return EntityState::Unknown;
        };

        match self.transform {
            ValueTransform::Linear { coefficient } => raw
                .as_f64()
                .map(|value| EntityState::Numeric(value * coefficient))
                .unwrap_or(EntityState::Unknown),
            ValueTransform::Mapping(mapping) => raw
                .as_i64()
                .and_then(|code| mapping.iter().find(|(candidate, _)| *candidate == code))
                .map(|(_, label)| EntityState::Label(label))
                .unwrap_or(EntityState::Unknown),
            ValueTransform::Toggle { on, .. } => raw
                .as_i64()
                .map(|value| EntityState::Toggle(value == on))
                .unwrap_or(EntityState::Unknown),
            ValueTransform::Text => EntityState::Text(raw.to_string()),
        }
    }
}

/// What an entity reports for the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    Unknown,
    Numeric(f64),
    Label(&'static str),
    Toggle(bool),
    Text(String),
}

impl EntityState {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Label(label) => f.write_str(label),
            Self::Toggle(true) => f.write_str("on"),
            Self::Toggle(false) => f.write_str("off"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Every descriptor applicable to a generation.
pub fn descriptors_for(generation: Generation) -> impl Iterator<Item = &'static EntityDescriptor> {
    SENSORS_GEN1
        .iter()
        .chain(SENSORS_GEN2)
        .chain(NUMBERS)
        .chain(SELECTS)
        .chain(SWITCHES)
        .filter(move |descriptor| descriptor.applies_to(generation))
}

/// The generation-specific view of the data-point tables: which keys to poll
/// and how each one is encoded.
#[derive(Debug, Clone)]
pub struct Schema {
    generation: Generation,
    encodings: HashMap<DataPointKey, RawEncoding>,
    poll_keys: Vec<DataPointKey>,
}

impl Schema {
    pub fn for_generation(generation: Generation) -> Self {
        let mut encodings = HashMap::new();
        for descriptor in descriptors_for(generation) {
            let key = descriptor.read_key();
            if let Some(existing) = encodings.insert(key.clone(), descriptor.encoding) {
                if existing != descriptor.encoding {
                    warn!(key = %key, entity = descriptor.id, "conflicting encodings for data point");
                }
            }
        }
        encodings
            .entry(WORKING_MODE_READ_KEY)
            .or_insert(RawEncoding::Integer);
        encodings
            .entry(DISCHARGE_LIMIT_READ_KEY)
            .or_insert(RawEncoding::Integer);

        let poll_keys = encodings
            .keys()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            generation,
            encodings,
            poll_keys,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn poll_keys(&self) -> &[DataPointKey] {
        &self.poll_keys
    }

    pub fn encoding(&self, key: &DataPointKey) -> Option<RawEncoding> {
        self.encodings.get(key).copied()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static EntityDescriptor> {
        descriptors_for(self.generation)
    }

    pub fn descriptor(&self, id: &str) -> Option<&'static EntityDescriptor> {
        self.descriptors().find(|descriptor| descriptor.id == id)
    }

    pub fn power_limits(&self) -> PowerLimits {
        PowerLimits::for_generation(self.generation)
    }

    /// Builds a snapshot from a raw poll result. Unregistered keys are ignored
    /// and values that do not match their declared encoding are dropped, so
    /// both read as unknown.
    pub fn ingest(&self, reading: &HashMap<String, Value>, collected_at_ms: u64) -> DeviceSnapshot {
        let mut values = HashMap::with_capacity(reading.len());
        for (id, raw) in reading {
            let key = DataPointKey::new(id.as_str());
            let Some(encoding) = self.encoding(&key) else {
                debug!(key = %key, "ignoring unregistered data point");
                continue;
            };
            match normalize(encoding, raw) {
                Some(value) => {
                    values.insert(key, value);
                }
                None => {
                    warn!(key = %key, ?encoding, value = %raw, "dropping data point with unexpected encoding");
                }
            }
        }
        DeviceSnapshot::new(values, collected_at_ms)
    }
}

/// Converts one raw JSON value according to its declared encoding.
pub fn normalize(encoding: RawEncoding, raw: &Value) -> Option<RawValue> {
    match (encoding, raw) {
        (RawEncoding::Integer, Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral))
            .map(RawValue::Integer),
        (RawEncoding::Integer, Value::String(text)) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
                .map(RawValue::Integer)
        }
        (RawEncoding::Decimal, Value::Number(number)) => number.as_f64().map(RawValue::Decimal),
        (RawEncoding::Decimal, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(RawValue::Decimal),
        (RawEncoding::Text, Value::String(text)) => Some(RawValue::Text(text.clone())),
        (RawEncoding::Text, Value::Number(number)) => Some(RawValue::Text(number.to_string())),
        _ => None,
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integer_encoding_accepts_numeric_strings_once() {
        assert_eq!(normalize(RawEncoding::Integer, &json!(4)), Some(RawValue::Integer(4)));
        assert_eq!(normalize(RawEncoding::Integer, &json!("4")), Some(RawValue::Integer(4)));
        assert_eq!(normalize(RawEncoding::Integer, &json!(4.0)), Some(RawValue::Integer(4)));
        assert_eq!(normalize(RawEncoding::Integer, &json!(4.5)), None);
        assert_eq!(normalize(RawEncoding::Integer, &json!("four")), None);
        assert_eq!(normalize(RawEncoding::Integer, &json!(null)), None);
    }

    #[test]
    fn decimal_and_text_encodings() {
        assert_eq!(normalize(RawEncoding::Decimal, &json!(230.4)), Some(RawValue::Decimal(230.4)));
        assert_eq!(normalize(RawEncoding::Decimal, &json!("49.98")), Some(RawValue::Decimal(49.98)));
        assert_eq!(normalize(RawEncoding::Decimal, &json!(true)), None);
        assert_eq!(
            normalize(RawEncoding::Text, &json!("BK16001234")),
            Some(RawValue::Text("BK16001234".to_string()))
        );
        assert_eq!(normalize(RawEncoding::Text, &json!(42)), Some(RawValue::Text("42".to_string())));
    }

    #[test]
    fn working_mode_key_is_always_polled() {
        for generation in [Generation::Gen1, Generation::Gen2] {
            let schema = Schema::for_generation(generation);
            assert!(schema.poll_keys().contains(&WORKING_MODE_READ_KEY));
        }
    }
}
