use std::sync::Arc;

use coordinator::{Coordinator, CoordinatorConfig, EntityError};
use datapoint_schema::EntityState;
use device_client::{ClientCall, MemoryDeviceClient};
use types::{DataPointKey, DeviceInfo, WriteValue};

fn coordinator(client: &Arc<MemoryDeviceClient>, model: &str) -> Coordinator {
    Coordinator::new(
        DeviceInfo::new("battery-1", "127.0.0.1", model),
        client.clone(),
        CoordinatorConfig::default(),
    )
}

#[tokio::test]
async fn entity_set_is_generation_specific() {
    let client = Arc::new(MemoryDeviceClient::new());
    let gen1 = coordinator(&client, "BK1600");
    let gen2 = coordinator(&client, "SolidFlex/PowerFlex2000");

    assert!(gen1.entity("working_mode").is_some());
    assert!(gen1.entity("charge_limit").is_some());
    assert!(gen1.entity("discharge_limit").is_some());
    assert!(gen1.entity("grid_charging").is_none());
    assert!(gen2.entity("charge_limit").is_some());
    assert!(gen2.entity("grid_charging").is_some());

    let unique_ids: Vec<String> = gen2.entities().iter().map(|entity| entity.unique_id()).collect();
    assert!(unique_ids.contains(&"battery-1_battery_power".to_string()));
}

#[tokio::test]
async fn entity_state_projects_latest_snapshot() {
    let client = Arc::new(
        MemoryDeviceClient::new()
            .with_value("7101", 4)
            .with_value("6000", -350),
    );
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let mode = coordinator.entity("working_mode").expect("working mode");
    let power = coordinator.entity("battery_power").expect("battery power");

    assert!(mode.state().is_unknown());
    assert!(!power.is_available());

    coordinator.refresh().await.expect("refresh");
    assert_eq!(mode.state(), EntityState::Label("real_time_control"));
    assert_eq!(power.state(), EntityState::Numeric(-350.0));
    assert!(coordinator.entity("grid_voltage").expect("grid voltage").state().is_unknown());
}

#[tokio::test]
async fn select_option_writes_then_refreshes() {
    let client = Arc::new(
        MemoryDeviceClient::new()
            .with_value("7101", 1)
            .with_mirror("47005", "7101"),
    );
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let mode = coordinator.entity("working_mode").expect("working mode");

    mode.select_option("charge_discharge_schedule").await.expect("select");
    assert_eq!(
        client.calls(),
        vec![
            ClientCall::WriteOne(DataPointKey::from_static("47005"), WriteValue::Single(5)),
            ClientCall::ReadAll,
        ]
    );
    assert_eq!(mode.state(), EntityState::Label("charge_discharge_schedule"));

    let err = mode.select_option("outdoor_portable").await.expect_err("unknown option");
    assert!(matches!(err, EntityError::UnknownOption { .. }));
    assert_eq!(client.writes().len(), 1);
}

#[tokio::test]
async fn number_rejects_out_of_range_without_writing() {
    let client = Arc::new(MemoryDeviceClient::new());
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let limit = coordinator.entity("max_ac_output_power").expect("number");

    let err = limit.set_value(2500.0).await.expect_err("out of range");
    assert!(matches!(err, EntityError::OutOfRange { max, .. } if max == 2400.0));
    assert!(client.calls().is_empty());

    limit.set_value(1200.7).await.expect("set value");
    assert_eq!(
        client.writes(),
        vec![(DataPointKey::from_static("1147"), WriteValue::Single(1200))]
    );
}

#[tokio::test]
async fn switch_writes_configured_raw_values() {
    let client = Arc::new(MemoryDeviceClient::new().with_value("2618", 1001));
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let grid_charging = coordinator.entity("grid_charging").expect("switch");

    coordinator.refresh().await.expect("refresh");
    assert_eq!(grid_charging.state(), EntityState::Toggle(true));

    grid_charging.turn_off().await.expect("turn off");
    grid_charging.turn_on().await.expect("turn on");
    assert_eq!(
        client.writes(),
        vec![
            (DataPointKey::from_static("1143"), WriteValue::Single(0)),
            (DataPointKey::from_static("1143"), WriteValue::Single(1)),
        ]
    );
}

#[tokio::test]
async fn sensors_refuse_writes() {
    let client = Arc::new(MemoryDeviceClient::new());
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let sensor = coordinator.entity("battery_power").expect("sensor");

    let err = sensor.set_value(10.0).await.expect_err("sensor");
    assert!(matches!(err, EntityError::Unsupported { operation: "set_value", .. }));
    assert!(matches!(sensor.turn_on().await, Err(EntityError::Unsupported { .. })));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn failed_write_skips_refresh() {
    let client = Arc::new(MemoryDeviceClient::new());
    client.reject_writes(true);
    let coordinator = coordinator(&client, "SolidFlex/PowerFlex2000");
    let light = coordinator.entity("light").expect("switch");

    let err = light.turn_on().await.expect_err("rejected");
    assert!(matches!(err, EntityError::Write(_)));
    assert_eq!(client.read_count(), 0);
}
