use std::collections::{HashMap, HashSet};

use datapoint_schema::{
    descriptors_for, EntityKind, EntityState, PowerLimits, Schema, WorkingMode, WORKING_MODE_READ_KEY,
    WORKING_MODE_WRITE_KEY,
};
use serde_json::json;
use types::{DataPointKey, Generation, RawValue};

fn reading(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn entity_ids_are_unique_per_generation() {
    for generation in [Generation::Gen1, Generation::Gen2] {
        let mut seen = HashSet::new();
        for descriptor in descriptors_for(generation) {
            assert!(
                seen.insert(descriptor.id),
                "duplicate entity id {} for generation {generation}",
                descriptor.id
            );
        }
    }
}

#[test]
fn numbers_apply_to_every_generation_but_select_and_switches_do_not() {
    let mut gen1_writable: Vec<_> = descriptors_for(Generation::Gen1)
        .filter(|descriptor| descriptor.write_key().is_some())
        .map(|descriptor| descriptor.id)
        .collect();
    gen1_writable.sort_unstable();
    assert_eq!(
        gen1_writable,
        vec![
            "charge_limit",
            "discharge_limit",
            "feedin_power_limit",
            "inverter_input_limit",
            "max_ac_output_power",
        ]
    );

    let gen2_selects: Vec<_> = descriptors_for(Generation::Gen2)
        .filter(|descriptor| descriptor.kind == EntityKind::Select)
        .collect();
    assert_eq!(gen2_selects.len(), 1);
    assert_eq!(gen2_selects[0].read_key(), WORKING_MODE_READ_KEY);
    assert_eq!(gen2_selects[0].write_key(), Some(WORKING_MODE_WRITE_KEY));
}

#[test]
fn gen1_battery_soc_and_charge_limit_share_a_decimal_key() {
    let schema = Schema::for_generation(Generation::Gen1);
    let snapshot = schema.ingest(&reading(&[("6002", json!(55.5)), ("6105", json!(15))]), 0);

    let soc = schema.descriptor("battery_soc").expect("descriptor");
    let limit = schema.descriptor("charge_limit").expect("descriptor");
    assert_eq!(soc.project(Some(&snapshot)), EntityState::Numeric(55.5));
    assert_eq!(limit.project(Some(&snapshot)), EntityState::Numeric(55.5));
    assert_eq!(snapshot.integer(&DataPointKey::from_static("6105")), Some(15));
}

#[test]
fn ingest_keeps_absent_distinct_from_zero() {
    let schema = Schema::for_generation(Generation::Gen2);
    let snapshot = schema.ingest(&reading(&[("6000", json!(0)), ("7101", json!("4"))]), 42);

    assert_eq!(snapshot.get(&DataPointKey::from_static("6000")), Some(&RawValue::Decimal(0.0)));
    assert_eq!(snapshot.get(&DataPointKey::from_static("2108")), None);
    assert_eq!(snapshot.integer(&WORKING_MODE_READ_KEY), Some(4));
    assert_eq!(snapshot.collected_at_ms(), 42);
}

#[test]
fn ingest_drops_unregistered_and_malformed_points() {
    let schema = Schema::for_generation(Generation::Gen2);
    let snapshot = schema.ingest(
        &reading(&[("99999", json!(1)), ("6001", json!("charging")), ("6000", json!(-350))]),
        0,
    );

    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.contains(&DataPointKey::from_static("99999")));
    assert!(!snapshot.contains(&DataPointKey::from_static("6001")));
}

#[test]
fn enumerated_state_outside_mapping_is_unknown() {
    let schema = Schema::for_generation(Generation::Gen2);
    let battery_state = schema.descriptor("battery_state").expect("descriptor");

    let snapshot = schema.ingest(&reading(&[("6001", json!(1001))]), 0);
    assert_eq!(battery_state.project(Some(&snapshot)), EntityState::Label("Charging"));

    let snapshot = schema.ingest(&reading(&[("6001", json!(1234))]), 0);
    assert_eq!(battery_state.project(Some(&snapshot)), EntityState::Unknown);
    assert_eq!(battery_state.project(None), EntityState::Unknown);
}

#[test]
fn linear_coefficient_scales_generation_one_production() {
    let schema = Schema::for_generation(Generation::Gen1);
    let production = schema.descriptor("cumulative_production").expect("descriptor");
    let snapshot = schema.ingest(&reading(&[("1505", json!(123_456))]), 0);

    match production.project(Some(&snapshot)) {
        EntityState::Numeric(value) => assert!((value - 123.456).abs() < 1e-9),
        other => panic!("unexpected state {other:?}"),
    }
}

#[test]
fn switch_reads_on_value_exactly() {
    let schema = Schema::for_generation(Generation::Gen2);
    let grid_charging = schema.descriptor("grid_charging").expect("descriptor");

    let on = schema.ingest(&reading(&[("2618", json!(1001))]), 0);
    let off = schema.ingest(&reading(&[("2618", json!(1000))]), 0);
    assert_eq!(grid_charging.project(Some(&on)), EntityState::Toggle(true));
    assert_eq!(grid_charging.project(Some(&off)), EntityState::Toggle(false));
}

#[test]
fn serial_number_is_text() {
    let schema = Schema::for_generation(Generation::Gen2);
    let serial = schema.descriptor("serial_number").expect("descriptor");
    let snapshot = schema.ingest(&reading(&[("0", json!("SF2000-0042"))]), 0);
    assert_eq!(serial.project(Some(&snapshot)), EntityState::Text("SF2000-0042".to_string()));
    assert!(serial.diagnostic);
}

#[test]
fn working_mode_names_and_codes() {
    assert_eq!("real_time_control".parse::<WorkingMode>(), Ok(WorkingMode::RealTimeControl));
    assert_eq!(WorkingMode::RealTimeControl.code(), 4);
    assert_eq!(WorkingMode::from_code(0), Some(WorkingMode::OutdoorPortable));
    assert_eq!(WorkingMode::from_code(3), None);
    assert!("outdoor_portable".parse::<WorkingMode>().is_err());
    assert!("turbo".parse::<WorkingMode>().is_err());
}

#[test]
fn power_limits_differ_by_generation_and_direction() {
    assert_eq!(
        PowerLimits::for_generation(Generation::Gen1),
        PowerLimits {
            max_charge_w: 1_200,
            max_discharge_w: 800
        }
    );
    assert_eq!(Schema::for_generation(Generation::Gen2).power_limits().max_discharge_w, 2_400);
    assert_eq!(Generation::from_model("BK1600/BK1600Ultra"), Generation::Gen1);
    assert_eq!(Generation::from_model("SolidFlex/PowerFlex2000"), Generation::Gen2);
}
