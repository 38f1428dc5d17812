use crate::{EntityDescriptor as D, Unit, GEN1_ONLY, GEN2_ONLY};

const WORKING_MODE_LABELS: &[(i64, &str)] = &[
    (0, "Outdoor Portable"),
    (1, "Self-consumed Prioritized"),
    (4, "Real-time Control"),
    (5, "Charge/Discharge Schedule"),
];

const WORKING_MODE_OPTIONS: &[(i64, &str)] = &[
    (1, "self_consumed_prioritized"),
    (4, "real_time_control"),
    (5, "charge_discharge_schedule"),
];

const BATTERY_STATE_LABELS: &[(i64, &str)] =
    &[(1000, "Static"), (1001, "Charging"), (1002, "Discharging")];

const METER_STATUS_LABELS: &[(i64, &str)] = &[(1000, "ON"), (1001, "OFF")];

pub static SENSORS_GEN1: &[D] = &[
    D::sensor("dc_input_power_1", "DC Input Power 1", "1664", Unit::Watt).only(GEN1_ONLY),
    D::sensor("dc_input_power_2", "DC Input Power 2", "1665", Unit::Watt).only(GEN1_ONLY),
    D::sensor("total_ac_output_power", "Total AC Output Power", "2108", Unit::Watt).only(GEN1_ONLY),
    D::sensor("daily_production", "Daily Production", "1502", Unit::KilowattHour).only(GEN1_ONLY),
    D::sensor("cumulative_production", "Cumulative Production", "1505", Unit::KilowattHour)
        .scaled(0.001)
        .only(GEN1_ONLY),
    D::sensor("total_ac_input_power", "Total AC Input Power", "2101", Unit::Watt).only(GEN1_ONLY),
    D::sensor("total_ac_input_energy", "Total AC Input Energy", "2107", Unit::KilowattHour)
        .only(GEN1_ONLY),
    D::sensor("total_dc_output_power", "Total DC Output Power", "1501", Unit::Watt).only(GEN1_ONLY),
    D::sensor("battery_power", "Battery Power", "6000", Unit::Watt).only(GEN1_ONLY),
    D::sensor("battery_soc", "Battery SOC", "6002", Unit::Percent).only(GEN1_ONLY),
    D::sensor("battery_daily_charging_energy", "Battery Daily Charging Energy", "6004", Unit::KilowattHour)
        .only(GEN1_ONLY),
    D::sensor("battery_daily_discharging_energy", "Battery Daily Discharging Energy", "6005", Unit::KilowattHour)
        .only(GEN1_ONLY),
    D::sensor("battery_total_charging_energy", "Battery Total Charging Energy", "6006", Unit::KilowattHour)
        .only(GEN1_ONLY),
    D::sensor("battery_total_discharging_energy", "Battery Total Discharging Energy", "6007", Unit::KilowattHour)
        .only(GEN1_ONLY),
    D::sensor("meter_power", "Meter Power", "21028", Unit::Watt).only(GEN1_ONLY),
    D::enumeration("working_mode", "Working Mode", "7101", WORKING_MODE_LABELS).only(GEN1_ONLY),
    D::enumeration("battery_state", "Battery Charge/Discharge State", "6001", BATTERY_STATE_LABELS)
        .only(GEN1_ONLY),
    D::enumeration("meter_connection", "Meter Connection Status", "7120", METER_STATUS_LABELS)
        .only(GEN1_ONLY),
    D::text("serial_number", "Serial Number", "0").only(GEN1_ONLY),
];

pub static SENSORS_GEN2: &[D] = &[
    D::text("serial_number", "Serial Number", "0").only(GEN2_ONLY),
    D::sensor("rated_capacity", "Rated Capacity", "142", Unit::KilowattHour).only(GEN2_ONLY),
    D::sensor("total_ac_input_power", "Total AC Input Power", "2101", Unit::Watt).only(GEN2_ONLY),
    D::sensor("total_ac_output_power", "Total AC Output Power", "2108", Unit::Watt).only(GEN2_ONLY),
    D::sensor("bypass_power", "Bypass Power", "667", Unit::Watt).only(GEN2_ONLY),
    D::sensor("total_ac_output_energy", "Total AC Output Energy", "2107", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::sensor("total_ac_input_energy", "Total AC Input Energy", "2104", Unit::WattHour).only(GEN2_ONLY),
    D::sensor("off_grid_output_energy", "Off-grid Output Energy", "2105", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::sensor("bypass_input_energy", "Bypass Input Energy", "11034", Unit::WattHour).only(GEN2_ONLY),
    D::sensor("battery_daily_charging_energy", "Battery Daily Charging Energy", "6004", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::sensor("battery_daily_discharging_energy", "Battery Daily Discharging Energy", "6005", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::sensor("battery_total_charging_energy", "Battery Total Charging Energy", "6006", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::sensor("battery_total_discharging_energy", "Battery Total Discharging Energy", "6007", Unit::KilowattHour)
        .only(GEN2_ONLY),
    D::enumeration("meter_connection", "Meter Connection Status", "7120", METER_STATUS_LABELS)
        .only(GEN2_ONLY),
    D::sensor("meter_power", "Meter Power", "11016", Unit::Watt).only(GEN2_ONLY),
    D::sensor("grid_voltage", "Grid Voltage", "2600", Unit::Volt).only(GEN2_ONLY),
    D::sensor("grid_frequency", "Grid Frequency", "2612", Unit::Hertz).only(GEN2_ONLY),
    D::sensor("battery_power", "Battery Power", "6000", Unit::Watt).only(GEN2_ONLY),
    D::enumeration("battery_state", "Battery Charge/Discharge State", "6001", BATTERY_STATE_LABELS)
        .only(GEN2_ONLY),
    D::sensor("total_dc_output_power", "Total DC Output Power", "1501", Unit::Watt).only(GEN2_ONLY),
    D::sensor("daily_pv_production", "Daily PV Production", "1502", Unit::KilowattHour).only(GEN2_ONLY),
    D::sensor("dc_input_current_1", "DC Input Current 1", "1632", Unit::Ampere).only(GEN2_ONLY),
    D::sensor("dc_input_voltage_1", "DC Input Voltage 1", "1600", Unit::Volt).only(GEN2_ONLY),
    D::sensor("dc_input_power_1", "DC Input Power 1", "1664", Unit::Watt).only(GEN2_ONLY),
    D::sensor("dc_input_current_2", "DC Input Current 2", "1633", Unit::Ampere).only(GEN2_ONLY),
    D::sensor("dc_input_voltage_2", "DC Input Voltage 2", "1601", Unit::Volt).only(GEN2_ONLY),
    D::sensor("dc_input_power_2", "DC Input Power 2", "1665", Unit::Watt).only(GEN2_ONLY),
    D::sensor("dc_input_current_3", "DC Input Current 3", "1634", Unit::Ampere).only(GEN2_ONLY),
    D::sensor("dc_input_voltage_3", "DC Input Voltage 3", "1602", Unit::Volt).only(GEN2_ONLY),
    D::sensor("dc_input_power_3", "DC Input Power 3", "1666", Unit::Watt).only(GEN2_ONLY),
    D::sensor("dc_input_current_4", "DC Input Current 4", "1635", Unit::Ampere).only(GEN2_ONLY),
    D::sensor("dc_input_voltage_4", "DC Input Voltage 4", "1603", Unit::Volt).only(GEN2_ONLY),
    D::sensor("dc_input_power_4", "DC Input Power 4", "1667", Unit::Watt).only(GEN2_ONLY),
];

pub static NUMBERS: &[D] = &[
    D::number("charge_limit", "Charge Limit", "6002", "47017", Unit::Percent, 0.0, 100.0, 1.0),
    D::number("discharge_limit", "Discharge Limit", "6105", "1142", Unit::Percent, 0.0, 100.0, 1.0),
    D::number("max_ac_output_power", "Max AC Output Power", "11011", "1147", Unit::Watt, 0.0, 2400.0, 100.0),
    D::number("inverter_input_limit", "Inverter Input Limit", "11009", "1138", Unit::Watt, 100.0, 2400.0, 100.0),
    D::number("feedin_power_limit", "Feed-in Power Limit", "11010", "1146", Unit::Watt, 100.0, 2400.0, 100.0),
];

pub static SELECTS: &[D] =
    &[D::select("working_mode", "Working Mode", "7101", "47005", WORKING_MODE_OPTIONS).only(GEN2_ONLY)];

pub static SWITCHES: &[D] = &[
    D::switch("grid_charging", "Grid Charging", "2618", "1143", 1001).only(GEN2_ONLY),
    D::switch("light", "Light", "7171", "7265", 1).only(GEN2_ONLY),
    D::switch("bypass", "Bypass", "680", "7266", 1).only(GEN2_ONLY),
];
