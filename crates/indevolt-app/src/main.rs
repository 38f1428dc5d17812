use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use commands::{CommandDispatcher, CommandOutcome, DeviceRegistry};
use coordinator::Coordinator;
use device_client::{DeviceClient, HttpDeviceClient};
use indevolt_app::{Action, AppConfig, CliArgs};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = CliArgs::parse(env::args().skip(1))?;
    let config = AppConfig::load_with_path(args.config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    if let Some(listen) = &config.metrics_listen {
        install_metrics_exporter(listen)?;
    }

    let registry = build_registry(&config)?;
    for coordinator in registry.coordinators() {
        if let Err(err) = coordinator.refresh().await {
            warn!(device = %coordinator.info().id, error = %err, "initial refresh failed");
        }
    }

    let dispatcher = CommandDispatcher::new(registry.clone(), config.guard_failure_policy);
    let result = match args.action {
        Some(action) => run_action(&dispatcher, action).await,
        None => run_service(&registry, config.poller.poll_interval).await,
    };

    registry.shutdown_all().await;
    result
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_metrics_exporter(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen.parse().context("parse metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("install prometheus exporter")?;
    info!(listen = %addr, "metrics exporter listening");
    Ok(())
}

fn build_registry(config: &AppConfig) -> Result<DeviceRegistry> {
    let mut registry = DeviceRegistry::new();
    for device in &config.devices {
        let client = HttpDeviceClient::new(config.client_config(device))
            .with_context(|| format!("create client for device {}", device.id))?;
        let client: Arc<dyn DeviceClient> = Arc::new(client);
        let info = device.info();
        info!(
            device = %info.id,
            name = %info.display_name(),
            host = %info.host,
            generation = %info.generation,
            "device configured"
        );
        registry.insert(Coordinator::new(info, client, config.poller.clone()));
    }
    Ok(registry)
}

async fn run_action(dispatcher: &CommandDispatcher, action: Action) -> Result<()> {
    info!(action = ?action, "running command");
    let outcome = match action {
        Action::Charge {
            device,
            power_w,
            target_soc,
        } => dispatcher.charge(&device, power_w, target_soc).await,
        Action::Discharge {
            device,
            power_w,
            emergency_soc,
        } => dispatcher.discharge(&device, power_w, emergency_soc).await,
        Action::Stop { device } => dispatcher.stop(&device).await,
        Action::ChangeMode { device, mode } => dispatcher.change_mode(&device, &mode).await,
    }
    .context("command failed")?;

    match outcome {
        CommandOutcome::Applied => info!("command applied"),
        CommandOutcome::Skipped => warn!("command skipped, device did not enter real-time control"),
    }
    Ok(())
}

async fn run_service(registry: &DeviceRegistry, report_interval: Duration) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    for coordinator in registry.coordinators() {
        coordinator.spawn_polling();
    }

    let report_handle = tokio::spawn(report_task(registry.clone(), report_interval, shutdown_rx.clone()));
    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx);

    tokio::signal::ctrl_c().await.context("wait for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = report_handle.await;
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

async fn report_task(registry: DeviceRegistry, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = sleep(interval) => log_states(&registry),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn log_states(registry: &DeviceRegistry) {
    for coordinator in registry.coordinators() {
        let entities = coordinator.entities();
        let mut known = 0usize;
        for entity in &entities {
            let state = entity.state();
            if !state.is_unknown() {
                known += 1;
            }
            debug!(entity = %entity.unique_id(), state = %state, "entity state");
        }
        info!(
            device = %coordinator.info().id,
            available = coordinator.is_available(),
            known,
            total = entities.len(),
            "device state"
        );
    }
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(mut shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID").ok().and_then(|value| value.parse::<u32>().ok()) {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
