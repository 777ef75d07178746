//! Telemetry to time-series point conversion
//!
//! Pure mapping, no error paths. All points of one scrape share the
//! timestamp handed in by the caller.

use crate::envoy::{Battery, Inverter, Line, ProductionResponse};
use chrono::{DateTime, Utc};
use envoy_libs::influxdb::{FieldValue, LineProtocolBuilder};
use std::collections::BTreeMap;

// Gateway measurement labels
pub const MEASUREMENT_PRODUCTION: &str = "production";
pub const MEASUREMENT_TOTAL_CONSUMPTION: &str = "total-consumption";
pub const MEASUREMENT_NET_CONSUMPTION: &str = "net-consumption";

// Emitted measurement-type tag values
pub const TYPE_PRODUCTION: &str = "production";
pub const TYPE_CONSUMPTION: &str = "consumption";
pub const TYPE_NET: &str = "net";
pub const TYPE_INVERTER: &str = "inverter";
pub const TYPE_BATTERY: &str = "battery";

pub const TAG_SOURCE: &str = "source";
pub const TAG_MEASUREMENT_TYPE: &str = "measurement-type";
pub const TAG_LINE_IDX: &str = "line-idx";
pub const TAG_SERIAL: &str = "serial";

pub const FIELD_P: &str = "P";
pub const FIELD_Q: &str = "Q";
pub const FIELD_S: &str = "S";
pub const FIELD_I_RMS: &str = "I_rms";
pub const FIELD_V_RMS: &str = "V_rms";
pub const FIELD_PERCENT_FULL: &str = "percent-full";
pub const FIELD_TEMPERATURE: &str = "temperature";

/// One time-series record
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Point {
    /// Every point starts with its source and measurement-type tags
    pub fn new(
        name: impl Into<String>,
        measurement_type: &str,
        source_tag: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
        .tag(TAG_SOURCE, source_tag)
        .tag(TAG_MEASUREMENT_TYPE, measurement_type)
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Render as one line of `InfluxDB` line protocol with a nanosecond timestamp
    pub fn to_line_protocol(&self) -> String {
        let builder = self
            .tags
            .iter()
            .fold(LineProtocolBuilder::new(&self.name), |b, (k, v)| b.tag(k, v));
        self.fields
            .iter()
            .fold(builder, |b, (k, v)| b.field(k, v.clone()))
            .timestamp(self.timestamp.timestamp_nanos_opt().unwrap_or_default())
            .build()
    }
}

/// Raw results of one scrape; `None` marks a category that failed or was not fetched
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub production: Option<ProductionResponse>,
    pub inverters: Option<Vec<Inverter>>,
    pub batteries: Option<Vec<Battery>>,
}

impl TelemetrySnapshot {
    /// Union of all category points, production first, then inverters, then batteries
    pub fn to_points(&self, source_tag: &str, timestamp: DateTime<Utc>) -> Vec<Point> {
        let mut points = Vec::new();
        if let Some(prod) = &self.production {
            points.extend(production_points_from(prod, source_tag, timestamp));
        }
        if let Some(inverters) = &self.inverters {
            points.extend(inverter_points_from(inverters, source_tag, timestamp));
        }
        if let Some(batteries) = &self.batteries {
            points.extend(battery_points_from(batteries, source_tag, timestamp));
        }
        points
    }
}

/// Point for one circuit line of a meter
pub fn line_to_point(
    category: &str,
    line: &Line,
    index: usize,
    source_tag: &str,
    timestamp: DateTime<Utc>,
) -> Point {
    Point::new(format!("{category}-line{index}"), category, source_tag, timestamp)
        .tag(TAG_LINE_IDX, index.to_string())
        .field(FIELD_P, line.w_now)
        .field(FIELD_Q, line.react_pwr)
        .field(FIELD_S, line.apprnt_pwr)
        .field(FIELD_I_RMS, line.rms_current)
        .field(FIELD_V_RMS, line.rms_voltage)
}

fn lines_to_points<'a>(
    category: &'a str,
    lines: &'a [Line],
    source_tag: &'a str,
    timestamp: DateTime<Utc>,
) -> impl Iterator<Item = Point> + 'a {
    lines
        .iter()
        .enumerate()
        .map(move |(idx, line)| line_to_point(category, line, idx, source_tag, timestamp))
}

/// Production, total consumption and net consumption line points.
///
/// Unrecognised measurement labels are skipped.
pub fn production_points_from(
    prod: &ProductionResponse,
    source_tag: &str,
    timestamp: DateTime<Utc>,
) -> Vec<Point> {
    let mut points = Vec::new();

    for measure in &prod.production {
        if measure.measurement_type == MEASUREMENT_PRODUCTION {
            points.extend(lines_to_points(TYPE_PRODUCTION, &measure.lines, source_tag, timestamp));
        }
    }

    for measure in &prod.consumption {
        let category = match measure.measurement_type.as_str() {
            MEASUREMENT_TOTAL_CONSUMPTION => TYPE_CONSUMPTION,
            MEASUREMENT_NET_CONSUMPTION => TYPE_NET,
            _ => continue,
        };
        points.extend(lines_to_points(category, &measure.lines, source_tag, timestamp));
    }

    points
}

/// One point per inverter, in input order
pub fn inverter_points_from(
    inverters: &[Inverter],
    source_tag: &str,
    timestamp: DateTime<Utc>,
) -> Vec<Point> {
    inverters
        .iter()
        .map(|inv| {
            Point::new(
                format!("inverter-production-{}", inv.serial_number),
                TYPE_INVERTER,
                source_tag,
                timestamp,
            )
            .tag(TAG_SERIAL, inv.serial_number.as_str())
            .field(FIELD_P, inv.last_report_watts)
        })
        .collect()
}

/// One point per battery, in input order
pub fn battery_points_from(
    batteries: &[Battery],
    source_tag: &str,
    timestamp: DateTime<Utc>,
) -> Vec<Point> {
    batteries
        .iter()
        .map(|bat| {
            Point::new(
                format!("battery-{}", bat.serial_num),
                TYPE_BATTERY,
                source_tag,
                timestamp,
            )
            .tag(TAG_SERIAL, bat.serial_num.as_str())
            .field(FIELD_PERCENT_FULL, bat.percent_full)
            .field(FIELD_TEMPERATURE, bat.temperature)
        })
        .collect()
}
