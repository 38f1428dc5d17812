use thiserror::Error;
use tracing::{error, info};

use datapoint_schema::{EntityDescriptor, EntityKind, EntityState, ValueTransform};

use crate::{Coordinator, PollError, WriteError};

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity {0} is read-only")]
    ReadOnly(&'static str),
    #[error("entity {entity} does not support {operation}")]
    Unsupported {
        entity: &'static str,
        operation: &'static str,
    },
    #[error("value {value} for {entity} is outside {min}..={max}")]
    OutOfRange {
        entity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown option '{option}' for {entity}")]
    UnknownOption { entity: &'static str, option: String },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Refresh(#[from] PollError),
}

/// One exposed capability of a device, driven entirely by its descriptor.
#[derive(Clone)]
pub struct Entity {
    descriptor: &'static EntityDescriptor,
    coordinator: Coordinator,
}

impl Entity {
    pub(crate) fn new(descriptor: &'static EntityDescriptor, coordinator: Coordinator) -> Self {
        Self {
            descriptor,
            coordinator,
        }
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    pub fn id(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.coordinator.info().id, self.descriptor.id)
    }

    pub fn is_available(&self) -> bool {
        self.coordinator.is_available()
    }

    pub fn state(&self) -> EntityState {
        self.descriptor.project(self.coordinator.current_snapshot().as_deref())
    }

    /// Sets a number entity. Fractions are truncated before the write.
    pub async fn set_value(&self, value: f64) -> Result<(), EntityError> {
        let EntityKind::Number { min, max, .. } = self.descriptor.kind else {
            return Err(self.unsupported("set_value"));
        };
        if !value.is_finite() || value < min || value > max {
            return Err(EntityError::OutOfRange {
                entity: self.descriptor.id,
                value,
                min,
                max,
            });
        }
        self.write(value.trunc() as i64).await
    }

    pub async fn select_option(&self, option: &str) -> Result<(), EntityError> {
        if self.descriptor.kind != EntityKind::Select {
            return Err(self.unsupported("select_option"));
        }
        let code = self
            .descriptor
            .code_for(option)
            .ok_or_else(|| EntityError::UnknownOption {
                entity: self.descriptor.id,
                option: option.to_string(),
            })?;
        self.write(code).await
    }

    pub async fn turn_on(&self) -> Result<(), EntityError> {
        match self.descriptor.transform {
            ValueTransform::Toggle { write_on, .. } => self.write(write_on).await,
            _ => Err(self.unsupported("turn_on")),
        }
    }

    pub async fn turn_off(&self) -> Result<(), EntityError> {
        match self.descriptor.transform {
            ValueTransform::Toggle { write_off, .. } => self.write(write_off).await,
            _ => Err(self.unsupported("turn_off")),
        }
    }

    async fn write(&self, raw: i64) -> Result<(), EntityError> {
        let key = self
            .descriptor
            .write_key()
            .ok_or(EntityError::ReadOnly(self.descriptor.id))?;
        info!(entity = %self.unique_id(), key = %key, raw, "setting entity");

        let result = async {
            self.coordinator.push_data(&key, raw).await?;
            self.coordinator.refresh().await?;
            Ok::<_, EntityError>(())
        }
        .await;

        if let Err(err) = &result {
            error!(entity = %self.unique_id(), raw, error = %err, "failed to set entity");
        }
        result
    }

    fn unsupported(&self, operation: &'static str) -> EntityError {
        EntityError::Unsupported {
            entity: self.descriptor.id,
            operation,
        }
    }
}
