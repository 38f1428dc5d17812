//! In-memory device used by tests and dry runs.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::sleep;

use types::{DataPointKey, WriteValue};

use crate::{ClientError, DeviceClient, RawReading};

/// One recorded device round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    ReadAll,
    WriteOne(DataPointKey, WriteValue),
}

#[derive(Debug, Default)]
struct MemoryState {
    values: RawReading,
    mirrors: HashMap<DataPointKey, DataPointKey>,
    calls: Vec<ClientCall>,
    read_delay: Option<Duration>,
    fail_reads: bool,
    fail_writes: bool,
    reject_writes: bool,
}

/// A scripted device holding its data points in memory.
///
/// Reads return every stored value regardless of the requested keys. A
/// mirrored write key copies single-value writes onto its read key, the way
/// the real device reports a new working mode under a different id.
#[derive(Debug, Default)]
pub struct MemoryDeviceClient {
    state: Mutex<MemoryState>,
}

impl MemoryDeviceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.set_value(key, value);
        self
    }

    pub fn with_mirror(self, write_key: &'static str, read_key: &'static str) -> Self {
        self.state.lock().mirrors.insert(
            DataPointKey::from_static(write_key),
            DataPointKey::from_static(read_key),
        );
        self
    }

    pub fn set_value(&self, key: &str, value: impl Into<serde_json::Value>) {
        self.state.lock().values.insert(key.to_string(), value.into());
    }

    pub fn remove_value(&self, key: &str) {
        self.state.lock().values.remove(key);
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().values.get(key).cloned()
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = Some(delay);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn reject_writes(&self, reject: bool) {
        self.state.lock().reject_writes = reject;
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn read_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ClientCall::ReadAll))
            .count()
    }

    pub fn writes(&self) -> Vec<(DataPointKey, WriteValue)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ClientCall::WriteOne(key, value) => Some((key.clone(), value.clone())),
                ClientCall::ReadAll => None,
            })
            .collect()
    }
}

#[async_trait]
impl DeviceClient for MemoryDeviceClient {
    async fn read_all(&self, _keys: &[DataPointKey]) -> Result<RawReading, ClientError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(ClientCall::ReadAll);
            state.read_delay
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let state = self.state.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "device unreachable").into());
        }
        Ok(state.values.clone())
    }

    async fn write_one(&self, key: &DataPointKey, value: &WriteValue) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        state.calls.push(ClientCall::WriteOne(key.clone(), value.clone()));
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "device unreachable").into());
        }
        if state.reject_writes {
            return Err(ClientError::Rejected {
                key: key.clone(),
                reason: "write refused".to_string(),
            });
        }

        if let (Some(read_key), WriteValue::Single(raw)) = (state.mirrors.get(key).cloned(), value) {
            state.values.insert(read_key.to_string(), (*raw).into());
        }
        Ok(())
    }
}
