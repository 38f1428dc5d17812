use std::fmt;
use std::str::FromStr;

use types::{DataPointKey, Generation};

/// Working mode is read from one key and written through another.
pub const WORKING_MODE_READ_KEY: DataPointKey = DataPointKey::from_static("7101");
pub const WORKING_MODE_WRITE_KEY: DataPointKey = DataPointKey::from_static("47005");

/// Shared by charge, discharge and stop: `[selector, power, soc]`.
pub const BATTERY_CONTROL_KEY: DataPointKey = DataPointKey::from_static("47015");

/// Emergency (discharge floor) state of charge.
pub const DISCHARGE_LIMIT_READ_KEY: DataPointKey = DataPointKey::from_static("6105");

/// Device operating state governing whether manual power commands are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkingMode {
    /// Cannot be left programmatically.
    OutdoorPortable,
    SelfConsumedPrioritized,
    RealTimeControl,
    ChargeDischargeSchedule,
}

impl WorkingMode {
    /// Modes a caller may ask for by name.
    pub const SETTABLE: [WorkingMode; 3] = [
        Self::SelfConsumedPrioritized,
        Self::RealTimeControl,
        Self::ChargeDischargeSchedule,
    ];

    pub fn code(self) -> i64 {
        match self {
            Self::OutdoorPortable => 0,
            Self::SelfConsumedPrioritized => 1,
            Self::RealTimeControl => 4,
            Self::ChargeDischargeSchedule => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::OutdoorPortable),
            1 => Some(Self::SelfConsumedPrioritized),
            4 => Some(Self::RealTimeControl),
            5 => Some(Self::ChargeDischargeSchedule),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OutdoorPortable => "outdoor_portable",
            Self::SelfConsumedPrioritized => "self_consumed_prioritized",
            Self::RealTimeControl => "real_time_control",
            Self::ChargeDischargeSchedule => "charge_discharge_schedule",
        }
    }

    pub fn is_settable(self) -> bool {
        self != Self::OutdoorPortable
    }
}

impl fmt::Display for WorkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModeName(pub String);

impl fmt::Display for UnknownModeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = WorkingMode::SETTABLE.iter().map(|mode| mode.name()).collect();
        write!(f, "unknown working mode '{}', expected one of: {}", self.0, names.join(", "))
    }
}

impl std::error::Error for UnknownModeName {}

impl FromStr for WorkingMode {
    type Err = UnknownModeName;

    /// Parses one of the settable mode names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::SETTABLE
            .into_iter()
            .find(|mode| mode.name() == value.trim())
            .ok_or_else(|| UnknownModeName(value.to_string()))
    }
}

/// Power ceilings for manual battery commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLimits {
    pub max_charge_w: u32,
    pub max_discharge_w: u32,
}

impl PowerLimits {
    pub const fn for_generation(generation: Generation) -> Self {
        match generation {
            Generation::Gen1 => Self {
                max_charge_w: 1_200,
                max_discharge_w: 800,
            },
            Generation::Gen2 => Self {
                max_charge_w: 2_400,
                max_discharge_w: 2_400,
            },
        }
    }
}
