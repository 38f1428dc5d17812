use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use coordinator::Coordinator;
use datapoint_schema::{PowerLimits, WorkingMode, BATTERY_CONTROL_KEY, DISCHARGE_LIMIT_READ_KEY};
use types::{Generation, WriteValue};

use crate::guard::ensure_mode;
use crate::{CommandError, DeviceRegistry, Direction, ValidationError};

const DEFAULT_CHARGE_SOC: u8 = 100;
const DEFAULT_EMERGENCY_SOC: u8 = 10;

/// What happens when switching into real-time control fails for a transport
/// reason inside a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuardFailurePolicy {
    /// Log the failure and report the command as skipped.
    #[default]
    Silent,
    /// Return the failure to the caller.
    Surface,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown guard failure policy '{0}', expected silent or surface")]
pub struct UnknownPolicy(pub String);

impl FromStr for GuardFailurePolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "surface" => Ok(Self::Surface),
            _ => Err(UnknownPolicy(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// The working-mode switch failed and nothing was written.
    Skipped,
}

/// Selector written in the first slot of the battery control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryAction {
    Stop,
    Charge,
    Discharge,
}

impl BatteryAction {
    pub fn selector(self) -> i64 {
        match self {
            Self::Stop => 0,
            Self::Charge => 1,
            Self::Discharge => 2,
        }
    }
}

/// One requested battery action, alive for a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub action: BatteryAction,
    pub power_w: u32,
    pub soc: u8,
    pub generation: Generation,
}

impl PendingCommand {
    pub fn stop(generation: Generation) -> Self {
        Self {
            action: BatteryAction::Stop,
            power_w: 0,
            soc: 0,
            generation,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let limits = PowerLimits::for_generation(self.generation);
        let (direction, limit) = match self.action {
            BatteryAction::Stop => return Ok(()),
            BatteryAction::Charge => (Direction::Charge, limits.max_charge_w),
            BatteryAction::Discharge => (Direction::Discharge, limits.max_discharge_w),
        };
        if self.power_w > limit {
            return Err(ValidationError::PowerExceedsLimit {
                power: self.power_w,
                limit,
                generation: self.generation,
                direction,
            });
        }
        if self.soc > 100 {
            return Err(ValidationError::SocOutOfRange(self.soc));
        }
        Ok(())
    }

    pub fn payload(&self) -> WriteValue {
        WriteValue::from([self.action.selector(), i64::from(self.power_w), i64::from(self.soc)])
    }
}

/// Runs the named battery commands against registered devices.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: DeviceRegistry,
    policy: GuardFailurePolicy,
}

impl CommandDispatcher {
    pub fn new(registry: DeviceRegistry, policy: GuardFailurePolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> GuardFailurePolicy {
        self.policy
    }

    /// Charges at `power_w` up to `target_soc`, 100% when omitted.
    pub async fn charge(&self, device: &str, power_w: u32, target_soc: Option<u8>) -> Result<CommandOutcome, CommandError> {
        let coordinator = self.registry.get(device)?;
        let command = PendingCommand {
            action: BatteryAction::Charge,
            power_w,
            soc: target_soc.unwrap_or(DEFAULT_CHARGE_SOC),
            generation: coordinator.generation(),
        };
        self.run(coordinator, command).await
    }

    /// Discharges at `power_w` down to `emergency_soc`. When omitted, the
    /// device's own discharge limit is used, or 10% if that is unknown.
    pub async fn discharge(
        &self,
        device: &str,
        power_w: u32,
        emergency_soc: Option<u8>,
    ) -> Result<CommandOutcome, CommandError> {
        let coordinator = self.registry.get(device)?;
        let soc = match emergency_soc {
            Some(soc) => soc,
            None => device_emergency_soc(coordinator),
        };
        let command = PendingCommand {
            action: BatteryAction::Discharge,
            power_w,
            soc,
            generation: coordinator.generation(),
        };
        self.run(coordinator, command).await
    }

    pub async fn stop(&self, device: &str) -> Result<CommandOutcome, CommandError> {
        let coordinator = self.registry.get(device)?;
        let command = PendingCommand::stop(coordinator.generation());
        self.run(coordinator, command).await
    }

    /// Switches the working mode by name.
    pub async fn change_mode(&self, device: &str, mode_name: &str) -> Result<CommandOutcome, CommandError> {
        let coordinator = self.registry.get(device)?;
        let target: WorkingMode = mode_name.parse().map_err(ValidationError::from)?;
        info!(device = %device, mode = %target, "change mode requested");
        self.guard(coordinator, target).await
    }

    async fn run(&self, coordinator: &Coordinator, command: PendingCommand) -> Result<CommandOutcome, CommandError> {
        let device = coordinator.info().id.as_str();
        command.validate()?;
        info!(
            device = %device,
            action = ?command.action,
            power_w = command.power_w,
            soc = command.soc,
            "battery command requested"
        );

        if self.guard(coordinator, WorkingMode::RealTimeControl).await? == CommandOutcome::Skipped {
            return Ok(CommandOutcome::Skipped);
        }

        coordinator.push_data(&BATTERY_CONTROL_KEY, command.payload()).await?;
        coordinator.refresh().await?;
        Ok(CommandOutcome::Applied)
    }

    async fn guard(&self, coordinator: &Coordinator, target: WorkingMode) -> Result<CommandOutcome, CommandError> {
        match ensure_mode(coordinator, target).await {
            Ok(_) => Ok(CommandOutcome::Applied),
            Err(err) if err.is_validation() => Err(err),
            Err(err) => match self.policy {
                GuardFailurePolicy::Surface => Err(err),
                GuardFailurePolicy::Silent => {
                    warn!(
                        device = %coordinator.info().id,
                        target = %target,
                        error = %err,
                        "working mode switch failed, skipping command"
                    );
                    Ok(CommandOutcome::Skipped)
                }
            },
        }
    }
}

fn device_emergency_soc(coordinator: &Coordinator) -> u8 {
    coordinator
        .current_snapshot()
        .and_then(|snapshot| snapshot.integer(&DISCHARGE_LIMIT_READ_KEY))
        .and_then(|value| u8::try_from(value).ok())
        .unwrap_or(DEFAULT_EMERGENCY_SOC)
}
