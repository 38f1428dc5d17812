use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use commands::GuardFailurePolicy;
use indevolt_app::config::parse_devices;
use indevolt_app::AppConfig;
use types::Generation;

static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_CONFIG", fixture_path("config-valid.toml"));

    let config = AppConfig::load().expect("load config");
    config.validate().expect("validate config");

    env::remove_var("INDEVOLT_CONFIG");

    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[0].info().generation, Generation::Gen1);
    assert_eq!(config.devices[1].info().generation, Generation::Gen2);
    assert_eq!(config.client_config(&config.devices[0]).port, 8080);
    assert_eq!(config.client_config(&config.devices[1]).port, 8081);
    assert_eq!(config.client_config(&config.devices[1]).retry_count, 1);
    assert_eq!(config.poller.poll_interval, Duration::from_millis(15_000));
    assert_eq!(config.guard_failure_policy, GuardFailurePolicy::Surface);
    assert_eq!(config.metrics_listen.as_deref(), Some("127.0.0.1:9187"));
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_CONFIG", fixture_path("config-valid.json"));

    let config = AppConfig::load().expect("load config");
    config.validate().expect("validate config");

    env::remove_var("INDEVOLT_CONFIG");

    assert_eq!(config.devices[0].id, "10.0.0.12");
    assert_eq!(config.guard_failure_policy, GuardFailurePolicy::Silent);
}

#[test]
fn invalid_config_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_CONFIG", fixture_path("config-invalid.toml"));

    let config = AppConfig::load().expect("load config");
    assert!(config.validate().is_err());

    env::remove_var("INDEVOLT_CONFIG");
}

#[test]
fn env_overrides_file_values() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("INDEVOLT_POLL_INTERVAL_MS", "5000");
    env::set_var("INDEVOLT_GUARD_FAILURE_POLICY", "silent");

    let config = AppConfig::load().expect("load config");

    env::set_var("INDEVOLT_GUARD_FAILURE_POLICY", "loud");
    let rejected = AppConfig::load();

    env::remove_var("INDEVOLT_CONFIG");
    env::remove_var("INDEVOLT_POLL_INTERVAL_MS");
    env::remove_var("INDEVOLT_GUARD_FAILURE_POLICY");

    assert_eq!(config.poller.poll_interval, Duration::from_millis(5_000));
    assert_eq!(config.guard_failure_policy, GuardFailurePolicy::Silent);
    assert!(rejected.is_err());
}

#[test]
fn missing_devices_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    let config = AppConfig::load_with_path(None).expect("load config");
    assert!(config.validate().is_err());
}

#[test]
fn device_list_parses_ports_and_models() {
    let devices = parse_devices("192.168.1.40:8081=BK1600/BK1600Ultra, 192.168.1.41,");
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].port, Some(8081));
    assert_eq!(devices[0].info().generation, Generation::Gen1);
    assert_eq!(devices[1].id, "192.168.1.41");
    assert_eq!(devices[1].port, None);
    assert_eq!(devices[1].model, "");
}

#[test]
fn device_without_model_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_DEVICES", "192.168.1.40");

    let config = AppConfig::load_with_path(None).expect("load config");

    env::remove_var("INDEVOLT_DEVICES");

    let err = config.validate().expect_err("model is required");
    assert!(err.to_string().contains("devices.model"), "unexpected error: {err}");
}

#[test]
fn request_timeout_must_cover_http_retries() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("INDEVOLT_DEVICES", "192.168.1.40=BK1600/BK1600Ultra");

    let defaults = AppConfig::load_with_path(None).expect("load config");
    env::set_var("INDEVOLT_REQUEST_TIMEOUT_MS", "10000");
    let short = AppConfig::load_with_path(None).expect("load config");

    env::remove_var("INDEVOLT_DEVICES");
    env::remove_var("INDEVOLT_REQUEST_TIMEOUT_MS");

    defaults.validate().expect("defaults leave room for every retry");
    assert!(defaults.poller.request_timeout >= defaults.http.max_read_duration());

    let err = short.validate().expect_err("timeout too short");
    assert!(err.to_string().contains("poller.request_timeout_ms"), "unexpected error: {err}");
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
