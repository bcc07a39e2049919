//! Baseline profile: per-context statistics learned from history

use crate::error::Result;
use crate::metrics::MetricKind;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    WorkHours,
    OffHours,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::WorkHours => "work_hours",
            Context::OffHours => "off_hours",
        }
    }
}

/// Which weekday/hour window counts as work hours. Days are numbered from
/// Monday = 0; the hour window is `[work_start_hour, work_end_hour)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkSchedule {
    pub work_days: Vec<u32>,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        // Every day is a work day, so the split is effectively hour-only.
        WorkSchedule {
            work_days: vec![0, 1, 2, 3, 4, 5, 6],
            work_start_hour: 9,
            work_end_hour: 23,
        }
    }
}

impl WorkSchedule {
    pub fn context_for(&self, at: &NaiveDateTime) -> Context {
        let weekday = at.weekday().num_days_from_monday();
        let hour = at.hour();
        let is_work_day = self.work_days.contains(&weekday);
        let is_work_hour = hour >= self.work_start_hour && hour < self.work_end_hour;
        if is_work_day && is_work_hour {
            Context::WorkHours
        } else {
            Context::OffHours
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub contexts: BTreeMap<Context, BTreeMap<MetricKind, MetricStats>>,
    pub battery_drain_per_minute: Option<f64>,
    pub created_at: NaiveDateTime,
}

impl BaselineProfile {
    pub fn stats(&self, context: Context, kind: MetricKind) -> Option<MetricStats> {
        self.contexts.get(&context).and_then(|m| m.get(&kind)).copied()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes to a sibling temp file first so a reader never sees a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Missing file means no baseline yet; any other failure is an error.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }
}

/// The profile the live detector reads. Rebuilds publish a whole new
/// `Arc`, readers keep whatever snapshot they already hold.
#[derive(Debug, Default)]
pub struct SharedProfile {
    current: RwLock<Option<Arc<BaselineProfile>>>,
}

impl SharedProfile {
    pub fn new(profile: Option<BaselineProfile>) -> Self {
        Self { current: RwLock::new(profile.map(Arc::new)) }
    }

    pub fn current(&self) -> Option<Arc<BaselineProfile>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn publish(&self, profile: BaselineProfile) -> Option<Arc<BaselineProfile>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(Arc::new(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_default_schedule_is_hour_only() {
        let schedule = WorkSchedule::default();
        // 2024-03-04 is a Monday, 2024-03-09 a Saturday.
        assert_eq!(schedule.context_for(&at(2024, 3, 4, 9)), Context::WorkHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 9, 9)), Context::WorkHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 4, 8)), Context::OffHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 4, 22)), Context::WorkHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 4, 23)), Context::OffHours);
    }

    #[test]
    fn test_weekday_schedule_excludes_weekend() {
        let schedule = WorkSchedule { work_days: vec![0, 1, 2, 3, 4], ..WorkSchedule::default() };
        assert_eq!(schedule.context_for(&at(2024, 3, 4, 9)), Context::WorkHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 9, 9)), Context::OffHours);
        assert_eq!(schedule.context_for(&at(2024, 3, 10, 12)), Context::OffHours);
    }

    #[test]
    fn test_shared_profile_publish_swaps_snapshot() {
        let shared = SharedProfile::new(None);
        assert!(shared.current().is_none());

        let first = BaselineProfile {
            contexts: BTreeMap::new(),
            battery_drain_per_minute: None,
            created_at: at(2024, 3, 4, 9),
        };
        assert!(shared.publish(first.clone()).is_none());
        let held = shared.current().unwrap();

        let second = BaselineProfile { battery_drain_per_minute: Some(0.4), ..first };
        let previous = shared.publish(second).unwrap();
        assert_eq!(previous.battery_drain_per_minute, None);
        assert_eq!(held.battery_drain_per_minute, None);
        assert_eq!(shared.current().unwrap().battery_drain_per_minute, Some(0.4));
    }

    #[test]
    fn test_persisted_format_is_keyed_by_context() {
        let mut work = BTreeMap::new();
        work.insert(MetricKind::Cpu, MetricStats { avg: 42.0, std: 7.5 });
        let mut contexts = BTreeMap::new();
        contexts.insert(Context::WorkHours, work);
        let profile = BaselineProfile {
            contexts,
            battery_drain_per_minute: None,
            created_at: at(2024, 3, 4, 9),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["contexts"]["work_hours"]["cpu"]["avg"], 42.0);
        assert!(json["battery_drain_per_minute"].is_null());
        assert_eq!(json["created_at"], "2024-03-04T09:00:00");
    }
}
