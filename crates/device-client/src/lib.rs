use std::cmp::min;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use types::{DataPointKey, WriteValue};

pub mod memory;

pub use memory::{ClientCall, MemoryDeviceClient};

/// Raw poll result: data-point id to the JSON value the device reported.
pub type RawReading = HashMap<String, serde_json::Value>;

const SET_DATA_FUNCTION: u8 = 16;

/// Configuration options for talking to the device's local RPC API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of read retries after the initial attempt. Writes are never retried.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
}

impl ClientConfig {
    /// Backoff before retry number `attempt + 1`.
    pub fn retry_delay_ms(&self, attempt: usize) -> u64 {
        let base = self.retry_backoff_ms.max(1);
        let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor);
        let max = self.retry_max_backoff_ms.max(base);
        min(delay, max)
    }

    /// Longest a `read_all` can take when every attempt times out.
    pub fn max_read_duration(&self) -> Duration {
        let attempts = self.retry_count.saturating_add(1);
        let requests = self.timeout_ms.saturating_mul(attempts as u64);
        let backoff = (0..self.retry_count).fold(0u64, |total, attempt| {
            total.saturating_add(self.retry_delay_ms(attempt))
        });
        Duration::from_millis(requests.saturating_add(backoff))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            timeout_ms: 5_000,
            retry_count: 2,
            retry_backoff_ms: 200,
            retry_max_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid device address {0}:{1}")]
    InvalidAddress(String, u16),
    #[error("data point key {0} is not a numeric register")]
    InvalidKey(DataPointKey),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("device rejected write to {key}: {reason}")]
    Rejected { key: DataPointKey, reason: String },
    #[error("malformed device response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Raw read-all and write-one access to one physical device.
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    /// Polls the given data points in one round trip.
    async fn read_all(&self, keys: &[DataPointKey]) -> Result<RawReading, ClientError>;

    /// Writes a single data point.
    async fn write_one(&self, key: &DataPointKey, value: &WriteValue) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct GetDataConfig<'a> {
    t: &'a [u32],
}

#[derive(Serialize)]
struct SetDataConfig {
    f: u8,
    t: u32,
    v: Vec<i64>,
}

/// Client for the `/rpc/Indevolt.*` endpoints served on the local network.
#[derive(Debug)]
pub struct HttpDeviceClient {
    config: ClientConfig,
    base_url: String,
    http: Client,
}

impl HttpDeviceClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.host.trim().is_empty() || config.port == 0 {
            return Err(ClientError::InvalidAddress(config.host.clone(), config.port));
        }
        let http = Client::builder().user_agent("indevolt-app").build()?;
        let base_url = format!("http://{}:{}", config.host.trim(), config.port);
        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_data(&self, addresses: &[u32]) -> Result<RawReading, ClientError> {
        let config = serde_json::to_string(&GetDataConfig { t: addresses })
            .map_err(|err| ClientError::Decode(err.to_string()))?;
        let url = format!("{}/rpc/Indevolt.GetData", self.base_url);
        let request = async {
            self.http
                .get(&url)
                .query(&[("config", config.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json::<RawReading>()
                .await
        };

        match timeout(self.request_timeout(), request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn read_all(&self, keys: &[DataPointKey]) -> Result<RawReading, ClientError> {
        let addresses: Vec<u32> = keys
            .iter()
            .filter_map(|key| {
                let address = key.address();
                if address.is_none() {
                    debug!(key = %key, "skipping non-numeric data point");
                }
                address
            })
            .collect();
        if addresses.is_empty() {
            return Ok(RawReading::new());
        }

        let mut attempts = 0usize;
        loop {
            match self.get_data(&addresses).await {
                Ok(reading) => {
                    debug!(host = %self.config.host, points = reading.len(), "device read ok");
                    return Ok(reading);
                }
                Err(err) if attempts >= self.config.retry_count => return Err(err),
                Err(err) => {
                    warn!(host = %self.config.host, attempt = attempts, error = %err, "device read failed");
                }
            }

            let delay_ms = self.config.retry_delay_ms(attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn write_one(&self, key: &DataPointKey, value: &WriteValue) -> Result<(), ClientError> {
        let address = key.address().ok_or_else(|| ClientError::InvalidKey(key.clone()))?;
        let config = serde_json::to_string(&SetDataConfig {
            f: SET_DATA_FUNCTION,
            t: address,
            v: value.to_vec(),
        })
        .map_err(|err| ClientError::Decode(err.to_string()))?;
        let url = format!("{}/rpc/Indevolt.SetData", self.base_url);
        let request = async {
            let response = self
                .http
                .post(&url)
                .query(&[("config", config.as_str())])
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match timeout(self.request_timeout(), request).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                })
            }
        };

        if !status.is_success() {
            return Err(ClientError::Rejected {
                key: key.clone(),
                reason: format!("http status {status}"),
            });
        }
        check_write_body(key, &body)?;
        debug!(host = %self.config.host, key = %key, value = %value, "device write ok");
        Ok(())
    }
}

/// The device acknowledges writes with `{"result": true}`; an empty or
/// unrecognised body is accepted.
fn check_write_body(key: &DataPointKey, body: &str) -> Result<(), ClientError> {
    if body.trim().is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.get("result") == Some(&serde_json::Value::Bool(false)) => {
            Err(ClientError::Rejected {
                key: key.clone(),
                reason: value.to_string(),
            })
        }
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(key = %key, error = %err, "ignoring non-json write response");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_body_result_false_is_rejection() {
        let key = DataPointKey::from_static("47005");
        let err = check_write_body(&key, r#"{"result": false}"#).expect_err("rejected");
        assert!(err.is_rejection());
        assert!(check_write_body(&key, r#"{"result": true}"#).is_ok());
        assert!(check_write_body(&key, "").is_ok());
        assert!(check_write_body(&key, "ok").is_ok());
    }

    #[test]
    fn retry_delay_is_capped() {
        let config = ClientConfig {
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 500,
            ..ClientConfig::default()
        };
        assert_eq!(config.retry_delay_ms(0), 100);
        assert_eq!(config.retry_delay_ms(2), 400);
        assert_eq!(config.retry_delay_ms(3), 500);
        assert_eq!(config.retry_delay_ms(80), 500);
    }

    #[test]
    fn max_read_duration_covers_every_attempt() {
        // 3 x 5000ms requests plus 200ms and 400ms of backoff.
        assert_eq!(ClientConfig::default().max_read_duration(), Duration::from_millis(15_600));

        let config = ClientConfig {
            retry_count: 0,
            timeout_ms: 750,
            ..ClientConfig::default()
        };
        assert_eq!(config.max_read_duration(), Duration::from_millis(750));
    }

    #[test]
    fn empty_host_is_rejected() {
        let config = ClientConfig {
            host: " ".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            HttpDeviceClient::new(config),
            Err(ClientError::InvalidAddress(_, 8080))
        ));
    }
}
