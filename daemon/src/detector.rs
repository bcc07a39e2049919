//! Baseline anomaly detection

use crate::config::AnomalyConfig;
use crate::metrics::{MetricKind, MetricSample, MetricSet};
use crate::profile::{BaselineProfile, Context, MetricStats, WorkSchedule};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub kind: MetricKind,
    pub value: f64,
    pub threshold: f64,
    pub avg: f64,
    pub context: Context,
}

impl AnomalySignal {
    pub fn message(&self) -> String {
        let unit = self.kind.unit();
        format!(
            "{} is at {:.1}{unit}, usual for {} is {:.1}{unit} (alert above {:.1}{unit})",
            self.kind,
            self.value,
            self.context.as_str().replace('_', " "),
            self.avg,
            self.threshold,
        )
    }
}

pub trait Detector: Send + Sync {
    fn check(
        &self,
        current: &MetricSample,
        profile: Option<&BaselineProfile>,
        now: NaiveDateTime,
    ) -> Option<AnomalySignal>;
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
    schedule: WorkSchedule,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig, schedule: WorkSchedule) -> Self {
        Self { config, schedule }
    }

    /// Stats for `(context, kind)`, or the configured fallback when no
    /// profile has been learned yet or it lacks this entry.
    pub fn baseline_for(
        &self,
        kind: MetricKind,
        context: Context,
        profile: Option<&BaselineProfile>,
    ) -> MetricStats {
        profile
            .and_then(|p| p.stats(context, kind))
            .unwrap_or(MetricStats {
                avg: self.config.fallback_avg,
                std: self.config.fallback_std,
            })
    }

    /// Runs [`Detector::check`] for every monitored kind present in `samples`.
    pub fn check_for_anomalies(
        &self,
        samples: &MetricSet,
        profile: Option<&BaselineProfile>,
        now: NaiveDateTime,
    ) -> Vec<AnomalySignal> {
        if !self.config.enabled {
            return Vec::new();
        }
        self.config
            .monitored
            .iter()
            .filter_map(|&kind| samples.get(kind))
            .filter_map(|sample| self.check(sample, profile, now))
            .collect()
    }
}

impl Detector for AnomalyDetector {
    fn check(
        &self,
        current: &MetricSample,
        profile: Option<&BaselineProfile>,
        now: NaiveDateTime,
    ) -> Option<AnomalySignal> {
        let value = current.value?;
        let context = self.schedule.context_for(&now);
        let stats = self.baseline_for(current.kind, context, profile);
        let threshold = stats.avg + self.config.sigma * stats.std;

        (value > threshold).then_some(AnomalySignal {
            kind: current.kind,
            value,
            threshold,
            avg: stats.avg,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn profile_with(kind: MetricKind, avg: f64, std: f64) -> BaselineProfile {
        let mut stats = BTreeMap::new();
        stats.insert(kind, MetricStats { avg, std });
        let mut contexts = BTreeMap::new();
        contexts.insert(Context::WorkHours, stats);
        contexts.insert(Context::OffHours, BTreeMap::new());
        BaselineProfile { contexts, battery_drain_per_minute: None, created_at: monday_morning() }
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(AnomalyConfig::default(), WorkSchedule::default())
    }

    #[test]
    fn test_threshold_is_strict() {
        let profile = profile_with(MetricKind::Cpu, 50.0, 10.0);
        let d = detector();
        let now = monday_morning();

        let signal = d
            .check(&MetricSample::new(MetricKind::Cpu, 71.0, now), Some(&profile), now)
            .unwrap();
        assert_eq!(signal.kind, MetricKind::Cpu);
        assert!((signal.threshold - 70.0).abs() < 1e-9);
        assert_eq!(signal.avg, 50.0);
        assert_eq!(signal.context, Context::WorkHours);

        assert!(d.check(&MetricSample::new(MetricKind::Cpu, 70.0, now), Some(&profile), now).is_none());
    }

    #[test]
    fn test_falls_back_without_profile() {
        let d = detector();
        let now = monday_morning();
        // Fallback threshold is 50 + 2 * 15 = 80.
        assert!(d.check(&MetricSample::new(MetricKind::Cpu, 80.0, now), None, now).is_none());
        let signal = d.check(&MetricSample::new(MetricKind::Cpu, 80.5, now), None, now).unwrap();
        assert_eq!(signal.avg, 50.0);
        assert_eq!(signal.threshold, 80.0);
    }

    #[test]
    fn test_falls_back_for_missing_context_entry() {
        let profile = profile_with(MetricKind::Cpu, 10.0, 1.0);
        let d = detector();
        // 03:00 is off hours, which has no cpu entry.
        let night = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(3, 0, 0).unwrap();
        let stats = d.baseline_for(MetricKind::Cpu, Context::OffHours, Some(&profile));
        assert_eq!(stats, MetricStats { avg: 50.0, std: 15.0 });
        assert!(d.check(&MetricSample::new(MetricKind::Cpu, 20.0, night), Some(&profile), night).is_none());
    }

    #[test]
    fn test_generic_over_kind() {
        let profile = profile_with(MetricKind::Memory, 30.0, 5.0);
        let d = detector();
        let now = monday_morning();
        let signal = d.check(&MetricSample::new(MetricKind::Memory, 41.0, now), Some(&profile), now);
        assert_eq!(signal.map(|s| s.kind), Some(MetricKind::Memory));
    }

    #[test]
    fn test_absent_value_never_signals() {
        let now = monday_morning();
        assert!(detector().check(&MetricSample::absent(MetricKind::Cpu, now), None, now).is_none());
    }

    #[test]
    fn test_only_monitored_kinds_are_checked() {
        let d = detector();
        let now = monday_morning();
        let samples = MetricSet::from_values(
            now,
            &[(MetricKind::Cpu, Some(99.0)), (MetricKind::Memory, Some(99.0))],
        );
        let signals = d.check_for_anomalies(&samples, None, now);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, MetricKind::Cpu);

        let disabled = AnomalyDetector::new(
            AnomalyConfig { enabled: false, ..AnomalyConfig::default() },
            WorkSchedule::default(),
        );
        assert!(disabled.check_for_anomalies(&samples, None, now).is_empty());
    }

    #[test]
    fn test_message_mentions_context() {
        let signal = AnomalySignal {
            kind: MetricKind::Cpu,
            value: 91.0,
            threshold: 70.0,
            avg: 50.0,
            context: Context::WorkHours,
        };
        assert_eq!(signal.message(), "cpu is at 91.0%, usual for work hours is 50.0% (alert above 70.0%)");
    }
}
