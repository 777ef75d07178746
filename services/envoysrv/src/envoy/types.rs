//! Gateway response models
//!
//! Field names follow the JSON the gateway emits. Unknown fields are ignored
//! and missing numeric readings default to zero.

use serde::Deserialize;
use std::collections::HashMap;

/// `/production.json?details=1`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductionResponse {
    #[serde(default)]
    pub production: Vec<Measurement>,
    #[serde(default)]
    pub consumption: Vec<Measurement>,
}

impl ProductionResponse {
    pub fn is_empty(&self) -> bool {
        self.production.is_empty() && self.consumption.is_empty()
    }
}

/// One metering block of the production response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// `production`, `total-consumption` or `net-consumption`
    #[serde(default)]
    pub measurement_type: String,
    #[serde(default)]
    pub active_count: i64,
    #[serde(default)]
    pub w_now: f64,
    #[serde(default)]
    pub lines: Vec<Line>,
}

/// Per-phase (circuit line) readings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(default)]
    pub w_now: f64,
    #[serde(default)]
    pub react_pwr: f64,
    #[serde(default)]
    pub apprnt_pwr: f64,
    #[serde(default)]
    pub rms_current: f64,
    #[serde(default)]
    pub rms_voltage: f64,
}

/// `/api/v1/production/inverters` entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inverter {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub last_report_date: i64,
    #[serde(default)]
    pub dev_type: i64,
    #[serde(default)]
    pub last_report_watts: i64,
    #[serde(default)]
    pub max_report_watts: i64,
}

/// Storage battery from the ensemble inventory
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Battery {
    #[serde(default)]
    pub serial_num: String,
    #[serde(rename = "percentFull", default)]
    pub percent_full: i64,
    #[serde(default)]
    pub temperature: i64,
}

/// `/ivp/ensemble/inventory` group
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryGroup {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub devices: Vec<Battery>,
}

/// Inventory group holding the storage batteries
pub const BATTERY_GROUP: &str = "ENCHARGE";

/// Flatten the battery devices out of the ensemble inventory
pub fn batteries_from_inventory(groups: Vec<InventoryGroup>) -> Vec<Battery> {
    groups
        .into_iter()
        .filter(|g| g.kind == BATTERY_GROUP)
        .flat_map(|g| g.devices)
        .collect()
}

/// `/installer/pcu_comm_check`: device serial to signal level
pub type CommCheckResponse = HashMap<String, i64>;
