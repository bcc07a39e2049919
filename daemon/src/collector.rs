//! Host metrics collector (reads /proc and /sys on Linux)

mod linux;

pub use linux::LinuxMetricsSource;

use crate::metrics::{MetricSet, TopProcess};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub release: String,
    pub machine: String,
    pub cpu_count: u32,
}

/// Source of raw host readings. A reading that cannot be taken shows up as
/// an absent sample rather than an error.
pub trait MetricsSource: Send + Sync {
    fn get_all_metrics(&self) -> MetricSet;
    fn has_battery(&self) -> bool;
    fn has_temperature_sensor(&self) -> bool;
    /// `None` when there is no battery to report on.
    fn is_charging(&self) -> Option<bool>;
    fn top_process(&self) -> Option<TopProcess>;
    fn system_info(&self) -> SystemInfo;
}
