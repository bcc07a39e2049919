//! Live session state: scoring, anomaly checks and alert cooldowns

use crate::config::Config;
use crate::debounce::AlertDebouncer;
use crate::detector::{AnomalyDetector, AnomalySignal};
use crate::metrics::{MetricKind, MetricSet};
use crate::profile::{BaselineProfile, SharedProfile};
use crate::scoring::{CompositeHealth, HealthScorer};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Result of one sampling tick.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub health: CompositeHealth,
    /// Every metric above its threshold this tick.
    pub anomalies: Vec<AnomalySignal>,
    /// The subset that passed the cooldown and should be raised.
    pub alerts: Vec<AnomalySignal>,
}

/// Owns the state that outlives a single tick. One per daemon run.
pub struct HealthSession {
    scorer: HealthScorer,
    detector: AnomalyDetector,
    debouncer: AlertDebouncer,
    profile: SharedProfile,
}

impl HealthSession {
    pub fn new(config: &Config, profile: Option<BaselineProfile>) -> Self {
        Self {
            scorer: HealthScorer::new(config.weights.clone()),
            detector: AnomalyDetector::new(config.anomaly.clone(), config.baseline.schedule()),
            debouncer: AlertDebouncer::new(config.anomaly.cooldown_seconds),
            profile: SharedProfile::new(profile),
        }
    }

    pub fn calculate_health_score(&self, samples: &MetricSet) -> CompositeHealth {
        self.scorer.calculate_health_score(samples)
    }

    pub fn check_for_anomalies(&self, samples: &MetricSet, now: NaiveDateTime) -> Vec<AnomalySignal> {
        let profile = self.profile.current();
        self.detector.check_for_anomalies(samples, profile.as_deref(), now)
    }

    pub fn should_alert(&self, kind: MetricKind, now: NaiveDateTime) -> bool {
        self.debouncer.should_alert(kind, now)
    }

    pub fn evaluate(&self, samples: &MetricSet, now: NaiveDateTime) -> Evaluation {
        let health = self.calculate_health_score(samples);
        let anomalies = self.check_for_anomalies(samples, now);
        let alerts = anomalies
            .iter()
            .filter(|signal| self.should_alert(signal.kind, now))
            .cloned()
            .collect();
        Evaluation { health, anomalies, alerts }
    }

    pub fn profile(&self) -> Option<Arc<BaselineProfile>> {
        self.profile.current()
    }

    pub fn publish_profile(&self, profile: BaselineProfile) {
        self.profile.publish(profile);
    }
}
