use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use datapoint_schema::Schema;
use device_client::{ClientError, DeviceClient};
use types::{DataPointKey, DeviceInfo, DeviceSnapshot, Generation, WriteValue};

mod entity;

pub use entity::{Entity, EntityError};

const POLLS_TOTAL: &str = "indevolt_polls_total";
const POLL_FAILURES_TOTAL: &str = "indevolt_poll_failures_total";
const POLLS_COALESCED_TOTAL: &str = "indevolt_polls_coalesced_total";
const POLL_DURATION_SECONDS: &str = "indevolt_poll_duration_seconds";
const WRITES_TOTAL: &str = "indevolt_writes_total";
const WRITE_FAILURES_TOTAL: &str = "indevolt_write_failures_total";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    /// Upper bound for one client call, including any retries the client makes.
    pub request_timeout: Duration,
    pub jitter_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(20),
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("device unavailable: {0}")]
    Unavailable(#[source] Arc<ClientError>),
    #[error("poll timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("poll task aborted: {0}")]
    Aborted(String),
    #[error("coordinator is shut down")]
    ShutDown,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write to {key} failed: {source}")]
    Transport {
        key: DataPointKey,
        #[source]
        source: ClientError,
    },
    #[error("device rejected write to {key}: {reason}")]
    Rejected { key: DataPointKey, reason: String },
    #[error("write to {key} timed out after {timeout_ms}ms")]
    Timeout { key: DataPointKey, timeout_ms: u64 },
    #[error("coordinator is shut down")]
    ShutDown,
}

type SharedPoll = Shared<BoxFuture<'static, Result<(), PollError>>>;

/// Owns the cached state of one device and sequences all I/O against it.
///
/// The snapshot is only ever replaced wholesale by a successful refresh;
/// writes never touch it. Concurrent refreshes share a single device round
/// trip, and a write never overlaps a poll.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    info: DeviceInfo,
    schema: Schema,
    config: CoordinatorConfig,
    client: RwLock<Option<Arc<dyn DeviceClient>>>,
    snapshot: ArcSwapOption<DeviceSnapshot>,
    available: AtomicBool,
    in_flight: Mutex<Option<SharedPoll>>,
    io_lock: tokio::sync::Mutex<()>,
    /// Held while publishing or discarding the snapshot.
    publish: Mutex<()>,
    shutdown: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(info: DeviceInfo, client: Arc<dyn DeviceClient>, config: CoordinatorConfig) -> Self {
        let schema = Schema::for_generation(info.generation);
        let (shutdown, _) = watch::channel(false);
        info!(
            device = %info.id,
            model = %info.model,
            generation = %info.generation,
            poll_keys = schema.poll_keys().len(),
            "coordinator created"
        );
        Self {
            inner: Arc::new(Inner {
                info,
                schema,
                config,
                client: RwLock::new(Some(client)),
                snapshot: ArcSwapOption::empty(),
                available: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                io_lock: tokio::sync::Mutex::new(()),
                publish: Mutex::new(()),
                shutdown,
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn generation(&self) -> Generation {
        self.inner.info.generation
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The last published snapshot, or `None` before the first successful
    /// poll. Never performs I/O.
    pub fn current_snapshot(&self) -> Option<Arc<DeviceSnapshot>> {
        self.inner.snapshot.load_full()
    }

    /// Whether the most recent poll succeeded.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Entities for every descriptor applicable to this device's generation.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner
            .schema
            .descriptors()
            .map(|descriptor| Entity::new(descriptor, self.clone()))
            .collect()
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.inner
            .schema
            .descriptor(id)
            .map(|descriptor| Entity::new(descriptor, self.clone()))
    }

    /// Re-polls every registered key and replaces the snapshot on success.
    ///
    /// A call made while a poll is in flight awaits that poll's outcome
    /// instead of starting another round trip. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), PollError> {
        let poll = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.as_ref() {
                Some(poll) => {
                    counter!(POLLS_COALESCED_TOTAL, "device" => self.inner.info.id.clone()).increment(1);
                    debug!(device = %self.inner.info.id, "joining in-flight poll");
                    poll.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move { inner.poll().await });
                    let poll = async move {
                        task.await
                            .unwrap_or_else(|err| Err(PollError::Aborted(err.to_string())))
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(poll.clone());
                    poll
                }
            }
        };

        poll.await
    }

    /// Issues a single write. The snapshot is left untouched; callers that
    /// need to observe the effect must refresh afterwards.
    pub async fn push_data(&self, key: &DataPointKey, value: impl Into<WriteValue>) -> Result<(), WriteError> {
        let value = value.into();
        let client = self.inner.client().ok_or(WriteError::ShutDown)?;
        let device = self.inner.info.id.clone();

        let _io = self.inner.io_lock.lock().await;
        info!(device = %device, key = %key, value = %value, "pushing data point");
        counter!(WRITES_TOTAL, "device" => device.clone()).increment(1);

        let request_timeout = self.inner.config.request_timeout;
        let result = match timeout(request_timeout, client.write_one(key, &value)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ClientError::Rejected { reason, .. })) => Err(WriteError::Rejected {
                key: key.clone(),
                reason,
            }),
            Ok(Err(source)) => Err(WriteError::Transport {
                key: key.clone(),
                source,
            }),
            Err(_) => Err(WriteError::Timeout {
                key: key.clone(),
                timeout_ms: request_timeout.as_millis() as u64,
            }),
        };

        if let Err(err) = &result {
            counter!(WRITE_FAILURES_TOTAL, "device" => device.clone()).increment(1);
            warn!(device = %device, key = %key, error = %err, "write failed");
        }
        result
    }

    /// Starts the periodic refresh task. Returns `false` when it is already
    /// running or the coordinator has been shut down.
    pub fn spawn_polling(&self) -> bool {
        let mut poller = self.inner.poller.lock();
        if poller.is_some() || self.is_shut_down() {
            return false;
        }

        let shutdown = self.inner.shutdown.subscribe();
        *poller = Some(tokio::spawn(self.clone().run_polling(shutdown)));
        true
    }

    /// Cancels periodic polling, releases the client and discards the snapshot.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }

        let poller = self.inner.poller.lock().take();
        if let Some(handle) = poller {
            handle.abort();
            let _ = handle.await;
        }

        self.inner.client.write().take();
        {
            let _publish = self.inner.publish.lock();
            self.inner.snapshot.store(None);
            self.inner.available.store(false, Ordering::Release);
        }
        info!(device = %self.inner.info.id, "coordinator shut down");
    }

    async fn run_polling(self, mut shutdown: watch::Receiver<bool>) {
        let mut iteration = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle_start = Instant::now();
            let outcome = self.refresh().await;
            iteration = iteration.wrapping_add(1);
            let delay = jittered_delay(self.inner.config.poll_interval, self.inner.config.jitter_ms, iteration);
            info!(
                device = %self.inner.info.id,
                ok = outcome.is_ok(),
                elapsed_ms = cycle_start.elapsed().as_millis(),
                delay_ms = delay.as_millis(),
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(delay) => {},
                _ = shutdown.changed() => {},
            }
        }

        info!(device = %self.inner.info.id, "polling stopped");
    }
}

impl Inner {
    fn client(&self) -> Option<Arc<dyn DeviceClient>> {
        self.client.read().clone()
    }

    /// Runs one poll under the I/O lock. The in-flight marker is cleared
    /// before the lock is released, so a refresh issued after a queued write
    /// always starts a new poll.
    async fn poll(&self) -> Result<(), PollError> {
        let _io = self.io_lock.lock().await;
        let result = self.poll_locked().await;
        self.in_flight.lock().take();
        result
    }

    async fn poll_locked(&self) -> Result<(), PollError> {
        let client = self.client().ok_or(PollError::ShutDown)?;
        let device = self.info.id.clone();
        let started = Instant::now();
        counter!(POLLS_TOTAL, "device" => device.clone()).increment(1);

        let request_timeout = self.config.request_timeout;
        let result = match timeout(request_timeout, client.read_all(self.schema.poll_keys())).await {
            Ok(Ok(reading)) => Ok(reading),
            Ok(Err(err)) => Err(PollError::Unavailable(Arc::new(err))),
            Err(_) => Err(PollError::Timeout {
                timeout_ms: request_timeout.as_millis() as u64,
            }),
        };
        histogram!(POLL_DURATION_SECONDS, "device" => device.clone()).record(started.elapsed().as_secs_f64());

        match result {
            Ok(reading) => {
                let snapshot = self.schema.ingest(&reading, unix_ms());
                let _publish = self.publish.lock();
                if *self.shutdown.borrow() {
                    return Err(PollError::ShutDown);
                }
                debug!(device = %device, points = snapshot.len(), "snapshot replaced");
                self.snapshot.store(Some(Arc::new(snapshot)));
                if !self.available.swap(true, Ordering::AcqRel) {
                    info!(device = %device, "device available");
                }
                Ok(())
            }
            Err(err) => {
                counter!(POLL_FAILURES_TOTAL, "device" => device.clone()).increment(1);
                if self.available.swap(false, Ordering::AcqRel) {
                    warn!(device = %device, error = %err, "device unavailable, keeping last snapshot");
                } else {
                    debug!(device = %device, error = %err, "poll failed");
                }
                Err(err)
            }
        }
    }
}

fn jittered_delay(base: Duration, jitter_ms: u64, iteration: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }

    let jitter_window = jitter_ms.max(1);
    let seed = unix_ms().wrapping_add(iteration.wrapping_mul(1_664_525));
    let offset = seed % jitter_window;
    base + Duration::from_millis(offset)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_inside_window() {
        let base = Duration::from_secs(30);
        assert_eq!(jittered_delay(base, 0, 7), base);
        for iteration in 0..32 {
            let delay = jittered_delay(base, 250, iteration);
            assert!(delay >= base && delay < base + Duration::from_millis(250));
        }
    }
}
