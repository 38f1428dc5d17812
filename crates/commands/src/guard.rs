use tracing::{error, info, warn};

use coordinator::Coordinator;
use datapoint_schema::{WorkingMode, WORKING_MODE_READ_KEY, WORKING_MODE_WRITE_KEY};
use types::DeviceSnapshot;

use crate::{CommandError, ValidationError};

/// The working mode as last observed on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeReading {
    /// No snapshot yet, or the mode key is missing from it.
    Unknown,
    Known(WorkingMode),
    /// A code outside the known modes. Treated like any other non-target mode.
    Unrecognized(i64),
}

impl ModeReading {
    pub fn from_snapshot(snapshot: Option<&DeviceSnapshot>) -> Self {
        match snapshot.and_then(|snapshot| snapshot.integer(&WORKING_MODE_READ_KEY)) {
            None => Self::Unknown,
            Some(code) => WorkingMode::from_code(code).map_or(Self::Unrecognized(code), Self::Known),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    AlreadyActive,
    Switched { from: ModeReading },
}

/// Makes sure the device runs in `target` before a dependent command.
///
/// Outdoor portable mode is never left through this path. When the device
/// already runs in `target` nothing is written. Otherwise the mode is written
/// and the coordinator refreshed, once; success is reported as soon as both
/// complete, without checking the refreshed mode.
pub async fn ensure_mode(coordinator: &Coordinator, target: WorkingMode) -> Result<ModeTransition, CommandError> {
    let device = coordinator.info().id.as_str();
    if !target.is_settable() {
        return Err(ValidationError::ModeNotSettable(target).into());
    }

    let current = ModeReading::from_snapshot(coordinator.current_snapshot().as_deref());
    match current {
        ModeReading::Known(WorkingMode::OutdoorPortable) => {
            warn!(device = %device, target = %target, "device is in outdoor portable mode, refusing mode change");
            return Err(ValidationError::OutdoorModeLocked {
                device: device.to_string(),
                target,
            }
            .into());
        }
        ModeReading::Known(mode) if mode == target => return Ok(ModeTransition::AlreadyActive),
        _ => {}
    }

    info!(device = %device, from = ?current, target = %target, "switching working mode");
    let result = async {
        coordinator.push_data(&WORKING_MODE_WRITE_KEY, target.code()).await?;
        coordinator.refresh().await?;
        Ok::<_, CommandError>(ModeTransition::Switched { from: current })
    }
    .await;

    if let Err(err) = &result {
        error!(device = %device, target = %target, error = %err, "failed to switch working mode");
    }
    result
}
