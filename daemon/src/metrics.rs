//! Metric kinds, live samples and recorded history rows

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Battery,
    Temperature,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Battery,
        MetricKind::Temperature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Battery => "battery",
            MetricKind::Temperature => "temperature",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            _ => "%",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of one metric. `value` is `None` when the host could not
/// provide it (no sensor, permission denied).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub value: Option<f64>,
    pub timestamp: NaiveDateTime,
}

impl MetricSample {
    pub fn new(kind: MetricKind, value: f64, timestamp: NaiveDateTime) -> Self {
        Self { kind, value: Some(value), timestamp }
    }

    pub fn absent(kind: MetricKind, timestamp: NaiveDateTime) -> Self {
        Self { kind, value: None, timestamp }
    }

    pub fn display(&self) -> String {
        match self.value {
            Some(v) => format!("{:.1}{}", v, self.kind.unit()),
            None => "N/A".to_string(),
        }
    }
}

/// All samples taken in one collection cycle, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet {
    samples: BTreeMap<MetricKind, MetricSample>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set where every listed kind shares `timestamp`.
    pub fn from_values(timestamp: NaiveDateTime, values: &[(MetricKind, Option<f64>)]) -> Self {
        let mut set = Self::new();
        for &(kind, value) in values {
            set.insert(MetricSample { kind, value, timestamp });
        }
        set
    }

    pub fn insert(&mut self, sample: MetricSample) {
        self.samples.insert(sample.kind, sample);
    }

    pub fn get(&self, kind: MetricKind) -> Option<&MetricSample> {
        self.samples.get(&kind)
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.samples.get(&kind).and_then(|s| s.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.values()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProcess {
    pub name: String,
    pub cpu_percent: f64,
}

/// A persisted snapshot, one per logger tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: NaiveDateTime,
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
    pub battery: Option<f64>,
    pub temperature: Option<f64>,
    pub is_charging: Option<bool>,
    pub top_process_name: Option<String>,
    pub top_process_cpu: Option<f64>,
}

impl HistoryRow {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            cpu: None,
            memory: None,
            disk: None,
            battery: None,
            temperature: None,
            is_charging: None,
            top_process_name: None,
            top_process_cpu: None,
        }
    }

    pub fn from_metrics(timestamp: NaiveDateTime, metrics: &MetricSet) -> Self {
        let mut row = Self::new(timestamp);
        for kind in MetricKind::ALL {
            row.set_value(kind, metrics.value(kind));
        }
        row
    }

    pub fn with_charging(mut self, is_charging: Option<bool>) -> Self {
        self.is_charging = is_charging;
        self
    }

    pub fn with_top_process(mut self, top: Option<TopProcess>) -> Self {
        if let Some(top) = top {
            self.top_process_name = Some(top.name);
            self.top_process_cpu = Some(top.cpu_percent);
        }
        self
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::Disk => self.disk,
            MetricKind::Battery => self.battery,
            MetricKind::Temperature => self.temperature,
        }
    }

    pub fn set_value(&mut self, kind: MetricKind, value: Option<f64>) {
        let slot = match kind {
            MetricKind::Cpu => &mut self.cpu,
            MetricKind::Memory => &mut self.memory,
            MetricKind::Disk => &mut self.disk,
            MetricKind::Battery => &mut self.battery,
            MetricKind::Temperature => &mut self.temperature,
        };
        *slot = value;
    }

    /// On battery power with a readable charge level.
    pub fn is_discharging(&self) -> bool {
        self.battery.is_some() && self.is_charging == Some(false)
    }
}
