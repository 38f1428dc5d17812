//! User-facing battery commands layered over a device coordinator.
//!
//! Every command validates its input before touching the device, moves the
//! device into the working mode it requires, then writes and refreshes.

use std::fmt;

use thiserror::Error;

use coordinator::{PollError, WriteError};
use datapoint_schema::{UnknownModeName, WorkingMode};
use types::Generation;

mod dispatch;
mod guard;
mod registry;

pub use dispatch::{BatteryAction, CommandDispatcher, CommandOutcome, GuardFailurePolicy, PendingCommand, UnknownPolicy};
pub use guard::{ensure_mode, ModeReading, ModeTransition};
pub use registry::DeviceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Charge,
    Discharge,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge => f.write_str("charge"),
            Self::Discharge => f.write_str("discharge"),
        }
    }
}

/// Caller input that violates a precondition. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{direction} power {power}W exceeds the {generation} limit of {limit}W")]
    PowerExceedsLimit {
        power: u32,
        limit: u32,
        generation: Generation,
        direction: Direction,
    },
    #[error("state of charge {0}% is outside 0..=100")]
    SocOutOfRange(u8),
    #[error(transparent)]
    UnknownMode(#[from] UnknownModeName),
    #[error("working mode {0} cannot be requested")]
    ModeNotSettable(WorkingMode),
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("device {0} is not ready")]
    DeviceNotReady(String),
    #[error("device {device} is in outdoor portable mode and cannot switch to {target}")]
    OutdoorModeLocked { device: String, target: WorkingMode },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Refresh(#[from] PollError),
}

impl CommandError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
