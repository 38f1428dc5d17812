use std::collections::BTreeMap;

use tracing::info;

use coordinator::Coordinator;

use crate::ValidationError;

/// Explicit lookup from device id to its coordinator.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Coordinator>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a coordinator under its device id, returning any coordinator
    /// it replaced.
    pub fn insert(&mut self, coordinator: Coordinator) -> Option<Coordinator> {
        let id = coordinator.info().id.clone();
        self.devices.insert(id, coordinator)
    }

    /// The coordinator for `device`, if it is registered and still running.
    pub fn get(&self, device: &str) -> Result<&Coordinator, ValidationError> {
        let coordinator = self
            .devices
            .get(device)
            .ok_or_else(|| ValidationError::DeviceNotFound(device.to_string()))?;
        if coordinator.is_shut_down() {
            return Err(ValidationError::DeviceNotReady(device.to_string()));
        }
        Ok(coordinator)
    }

    pub fn coordinators(&self) -> impl Iterator<Item = &Coordinator> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub async fn shutdown_all(&self) {
        for coordinator in self.devices.values() {
            coordinator.shutdown().await;
        }
        info!(devices = self.devices.len(), "all coordinators shut down");
    }
}
