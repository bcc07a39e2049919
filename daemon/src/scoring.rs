//! Metric normalization and the weighted composite health score

use crate::metrics::{MetricKind, MetricSet};
use crate::status::StatusBand;
use serde::{Deserialize, Serialize};

/// Per-kind weights. They need not sum to 1; the scorer renormalizes over
/// whatever metrics are actually present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub battery: f64,
    pub temperature: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        WeightTable {
            cpu: 0.25,
            memory: 0.25,
            disk: 0.20,
            battery: 0.15,
            temperature: 0.15,
        }
    }
}

impl WeightTable {
    pub fn weight(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::Disk => self.disk,
            MetricKind::Battery => self.battery,
            MetricKind::Temperature => self.temperature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedScore {
    pub score: f64,
    pub weight: f64,
}

impl NormalizedScore {
    pub const ABSENT: NormalizedScore = NormalizedScore { score: 0.0, weight: 0.0 };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeHealth {
    pub score: f64,
    pub status: StatusBand,
}

/// Maps a raw value to 0-100 where 100 is healthy. An absent value carries
/// zero weight so it drops out of the composite.
pub fn normalize(kind: MetricKind, value: Option<f64>, weights: &WeightTable) -> NormalizedScore {
    let Some(value) = value else {
        return NormalizedScore::ABSENT;
    };
    let score = match kind {
        MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk => 100.0 - value,
        MetricKind::Battery => value,
        MetricKind::Temperature => temperature_score(value),
    };
    NormalizedScore { score, weight: weights.weight(kind) }
}

/// Piecewise-linear: flat to 60°C, 100→50 by 80°C, 50→5 by 95°C, then 0.
fn temperature_score(celsius: f64) -> f64 {
    if celsius < 60.0 {
        100.0
    } else if celsius < 80.0 {
        100.0 - (celsius - 60.0) * 2.5
    } else if celsius < 95.0 {
        50.0 - (celsius - 80.0) * 3.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    weights: WeightTable,
}

impl HealthScorer {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    pub fn normalize(&self, kind: MetricKind, value: Option<f64>) -> NormalizedScore {
        normalize(kind, value, &self.weights)
    }

    /// Weighted average over the available metrics, clamped to 0-100. With
    /// nothing available the host is reported as worst case (0) instead of NaN.
    pub fn score(&self, samples: &MetricSet) -> f64 {
        let (weighted_sum, total_weight) = samples
            .iter()
            .map(|sample| self.normalize(sample.kind, sample.value))
            .fold((0.0, 0.0), |(sum, total), n| (sum + n.score * n.weight, total + n.weight));

        if total_weight <= 0.0 {
            0.0
        } else {
            (weighted_sum / total_weight).clamp(0.0, 100.0)
        }
    }

    pub fn calculate_health_score(&self, samples: &MetricSet) -> CompositeHealth {
        let score = self.score(samples);
        CompositeHealth { score, status: StatusBand::classify(score) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_utilization_metrics_invert() {
        let weights = WeightTable::default();
        for value in [0.0, 12.5, 50.0, 99.9, 100.0] {
            let n = normalize(MetricKind::Cpu, Some(value), &weights);
            assert!(approx(n.score, 100.0 - value));
            assert!(approx(n.weight, 0.25));
        }
        assert!(approx(normalize(MetricKind::Disk, Some(30.0), &weights).score, 70.0));
    }

    #[test]
    fn test_absent_metric_has_no_weight() {
        let weights = WeightTable::default();
        for kind in MetricKind::ALL {
            assert_eq!(normalize(kind, None, &weights), NormalizedScore::ABSENT);
        }
    }

    #[test]
    fn test_battery_is_direct() {
        let n = normalize(MetricKind::Battery, Some(73.0), &WeightTable::default());
        assert!(approx(n.score, 73.0));
        assert!(approx(n.weight, 0.15));
    }

    #[test]
    fn test_temperature_curve() {
        assert!(approx(temperature_score(20.0), 100.0));
        assert!(approx(temperature_score(59.9), 100.0));
        assert!(approx(temperature_score(60.0), 100.0));
        assert!(approx(temperature_score(70.0), 75.0));
        assert!(approx(temperature_score(80.0), 50.0));
        assert!(approx(temperature_score(90.0), 20.0));
        assert!(approx(temperature_score(94.0), 8.0));
        assert!(approx(temperature_score(95.0), 0.0));
        assert!(approx(temperature_score(110.0), 0.0));
    }

    #[test]
    fn test_utilization_is_strictly_monotonic() {
        let weights = WeightTable::default();
        for kind in [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk] {
            let mut previous = f64::INFINITY;
            for step in 0..=20 {
                let score = normalize(kind, Some(step as f64 * 5.0), &weights).score;
                assert!(score < previous);
                previous = score;
            }
        }
    }

    #[test]
    fn test_empty_set_scores_zero() {
        let scorer = HealthScorer::default();
        assert_eq!(scorer.score(&MetricSet::new()), 0.0);
    }

    #[test]
    fn test_all_absent_scores_zero() {
        let scorer = HealthScorer::default();
        let values: Vec<_> = MetricKind::ALL.iter().map(|&k| (k, None)).collect();
        let health = scorer.calculate_health_score(&MetricSet::from_values(ts(), &values));
        assert_eq!(health.score, 0.0);
        assert_eq!(health.status, StatusBand::Critical);
    }

    #[test]
    fn test_zero_weight_metric_is_noop() {
        let scorer = HealthScorer::new(WeightTable { temperature: 0.0, ..WeightTable::default() });
        let base = MetricSet::from_values(
            ts(),
            &[(MetricKind::Cpu, Some(35.0)), (MetricKind::Memory, Some(70.0))],
        );
        let mut with_temp = base.clone();
        with_temp.insert(crate::metrics::MetricSample::new(MetricKind::Temperature, 99.0, ts()));
        assert!(approx(scorer.score(&base), scorer.score(&with_temp)));
    }

    #[test]
    fn test_missing_sensors_renormalize() {
        let scorer = HealthScorer::default();
        let samples = MetricSet::from_values(
            ts(),
            &[
                (MetricKind::Cpu, Some(90.0)),
                (MetricKind::Memory, Some(40.0)),
                (MetricKind::Disk, Some(30.0)),
                (MetricKind::Battery, None),
                (MetricKind::Temperature, None),
            ],
        );
        let health = scorer.calculate_health_score(&samples);
        assert!(approx(health.score, 45.0));
        assert_eq!(health.status, StatusBand::Fair);
    }

    #[test]
    fn test_full_sensor_set() {
        let scorer = HealthScorer::default();
        let samples = MetricSet::from_values(
            ts(),
            &[
                (MetricKind::Cpu, Some(10.0)),
                (MetricKind::Memory, Some(20.0)),
                (MetricKind::Disk, Some(50.0)),
                (MetricKind::Battery, Some(100.0)),
                (MetricKind::Temperature, Some(45.0)),
            ],
        );
        // 90*.25 + 80*.25 + 50*.20 + 100*.15 + 100*.15 = 82.5 over weight 1.0
        let health = scorer.calculate_health_score(&samples);
        assert!(approx(health.score, 82.5));
        assert_eq!(health.status, StatusBand::Excellent);
    }

    #[test]
    fn test_score_stays_in_range_with_bad_weights() {
        let scorer = HealthScorer::new(WeightTable { memory: -0.5, ..WeightTable::default() });
        let samples = MetricSet::from_values(
            ts(),
            &[(MetricKind::Cpu, Some(0.0)), (MetricKind::Memory, Some(100.0))],
        );
        // total weight is negative
        assert_eq!(scorer.score(&samples), 0.0);

        let scorer = HealthScorer::new(WeightTable { cpu: 1.0, memory: -0.5, ..WeightTable::default() });
        // 100 / 0.5 would be 200 unclamped
        let health = scorer.calculate_health_score(&samples);
        assert_eq!(health.score, 100.0);
        assert_eq!(health.status, StatusBand::Excellent);
    }

    #[test]
    fn test_out_of_range_reading_is_clamped() {
        let scorer = HealthScorer::default();
        let samples = MetricSet::from_values(ts(), &[(MetricKind::Cpu, Some(150.0))]);
        assert_eq!(scorer.score(&samples), 0.0);
    }
}
