use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use commands::GuardFailurePolicy;
use coordinator::CoordinatorConfig;
use device_client::ClientConfig;
use types::DeviceInfo;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: String,
    pub host: String,
    /// Falls back to `http.port` when unset.
    pub port: Option<u16>,
    /// Selects the device generation, and with it the power ceilings.
    pub model: String,
}

impl DeviceConfig {
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo::new(self.id.clone(), self.host.clone(), self.model.clone())
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub devices: Vec<DeviceConfig>,
    pub poller: CoordinatorConfig,
    pub http: ClientConfig,
    pub guard_failure_policy: GuardFailurePolicy,
    pub metrics_listen: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config)?;
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// HTTP client settings for one device.
    pub fn client_config(&self, device: &DeviceConfig) -> ClientConfig {
        ClientConfig {
            host: device.host.clone(),
            port: device.port.unwrap_or(self.http.port),
            ..self.http.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            anyhow::bail!("devices must list at least one device");
        }
        let mut ids = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                anyhow::bail!("devices.id must be non-empty");
            }
            if !ids.insert(device.id.as_str()) {
                anyhow::bail!("devices.id '{}' is configured more than once", device.id);
            }
            if device.host.trim().is_empty() {
                anyhow::bail!("devices.host must be non-empty for device '{}'", device.id);
            }
            if device.model.trim().is_empty() {
                anyhow::bail!("devices.model must be set for device '{}'", device.id);
            }
            if device.port == Some(0) {
                anyhow::bail!("devices.port must be between 1 and 65535 for device '{}'", device.id);
            }
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.request_timeout.as_millis() == 0 {
            anyhow::bail!("poller.request_timeout_ms must be >= 1");
        }
        if self.http.port == 0 {
            anyhow::bail!("http.port must be between 1 and 65535");
        }
        if self.http.timeout_ms == 0 {
            anyhow::bail!("http.timeout_ms must be >= 1");
        }
        if self.http.retry_backoff_ms == 0 {
            anyhow::bail!("http.retry_backoff_ms must be >= 1");
        }
        if self.http.retry_max_backoff_ms < self.http.retry_backoff_ms {
            anyhow::bail!("http.retry_max_backoff_ms must be >= http.retry_backoff_ms");
        }
        let max_read = self.http.max_read_duration();
        if self.poller.request_timeout < max_read {
            anyhow::bail!(
                "poller.request_timeout_ms must be >= {}ms to cover http.timeout_ms over {} attempts plus backoff",
                max_read.as_millis(),
                self.http.retry_count.saturating_add(1)
            );
        }
        if let Some(ref listen) = self.metrics_listen {
            listen
                .parse::<SocketAddr>()
                .map_err(|_| anyhow::anyhow!("metrics.listen must be a socket address (e.g. 0.0.0.0:9000)"))?;
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            poller: CoordinatorConfig::default(),
            http: ClientConfig::default(),
            guard_failure_policy: GuardFailurePolicy::default(),
            metrics_listen: None,
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    if let Ok(value) = env::var("INDEVOLT_DEVICES") {
        config.devices = parse_devices(&value);
    }

    if let Some(port) = parse_env_u16("INDEVOLT_PORT") {
        config.http.port = port;
    }

    if let Some(interval_ms) = parse_env_u64("INDEVOLT_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(timeout_ms) = parse_env_u64("INDEVOLT_REQUEST_TIMEOUT_MS") {
        config.poller.request_timeout = Duration::from_millis(timeout_ms);
    }

    if let Some(jitter_ms) = parse_env_u64("INDEVOLT_JITTER_MS") {
        config.poller.jitter_ms = jitter_ms;
    }

    if let Some(timeout_ms) = parse_env_u64("INDEVOLT_HTTP_TIMEOUT_MS") {
        config.http.timeout_ms = timeout_ms;
    }

    if let Some(retry_count) = parse_env_usize("INDEVOLT_RETRY_COUNT") {
        config.http.retry_count = retry_count;
    }

    if let Ok(value) = env::var("INDEVOLT_GUARD_FAILURE_POLICY") {
        config.guard_failure_policy = value
            .parse::<GuardFailurePolicy>()
            .context("INDEVOLT_GUARD_FAILURE_POLICY")?;
    }

    config.metrics_listen = env::var("INDEVOLT_METRICS_LISTEN").ok().or(config.metrics_listen.take());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    devices: Option<Vec<FileDeviceConfig>>,
    poller: Option<FilePollerConfig>,
    http: Option<FileHttpConfig>,
    commands: Option<FileCommandsConfig>,
    metrics: Option<FileMetricsConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    id: Option<String>,
    host: String,
    port: Option<u16>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    port: Option<u16>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileCommandsConfig {
    guard_failure_policy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileMetricsConfig {
    listen: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("INDEVOLT_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path).with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut AppConfig, file: FileConfig) -> Result<()> {
    if let Some(devices) = file.devices {
        config.devices = devices
            .into_iter()
            .map(|device| DeviceConfig {
                id: device.id.unwrap_or_else(|| device.host.clone()),
                host: device.host,
                port: device.port,
                model: device.model.unwrap_or_default(),
            })
            .collect();
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(timeout_ms) = poller.request_timeout_ms {
            config.poller.request_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(jitter_ms) = poller.jitter_ms {
            config.poller.jitter_ms = jitter_ms;
        }
    }

    if let Some(http) = file.http {
        if let Some(port) = http.port {
            config.http.port = port;
        }
        if let Some(timeout_ms) = http.timeout_ms {
            config.http.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = http.retry_count {
            config.http.retry_count = retry_count;
        }
        if let Some(backoff) = http.retry_backoff_ms {
            config.http.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = http.retry_max_backoff_ms {
            config.http.retry_max_backoff_ms = max_backoff;
        }
    }

    if let Some(policy) = file.commands.and_then(|commands| commands.guard_failure_policy) {
        config.guard_failure_policy = policy
            .parse::<GuardFailurePolicy>()
            .context("commands.guard_failure_policy")?;
    }

    if let Some(listen) = file.metrics.and_then(|metrics| metrics.listen) {
        config.metrics_listen = Some(listen);
    }

    Ok(())
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Parses `host[:port]=model` entries separated by commas. The host doubles
/// as the device id. An entry without a model is kept so validation can name it.
pub fn parse_devices(value: &str) -> Vec<DeviceConfig> {
    value
        .split(',')
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return None;
            }
            let (address, model) = match trimmed.split_once('=') {
                Some((address, model)) => (address.trim(), model.trim()),
                None => (trimmed, ""),
            };
            let (host, port) = match address.split_once(':') {
                Some((host, port)) => (host, port.parse::<u16>().ok()),
                None => (address, None),
            };
            Some(DeviceConfig {
                id: host.to_string(),
                host: host.to_string(),
                port,
                model: model.to_string(),
            })
        })
        .collect()
}
