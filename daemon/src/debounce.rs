//! Per-metric alert cooldown

use crate::metrics::MetricKind;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_COOLDOWN_SECONDS: u64 = 300;

pub struct AlertDebouncer {
    cooldown: TimeDelta,
    last_alert: Mutex<HashMap<MetricKind, NaiveDateTime>>,
}

impl AlertDebouncer {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown: TimeDelta::seconds(cooldown_seconds as i64),
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    /// True when more than the cooldown has passed since the last alert for
    /// `kind`, in which case `now` becomes the new last-alert time. A kind
    /// that never alerted is treated as last alerting at the Unix epoch.
    pub fn should_alert(&self, kind: MetricKind, now: NaiveDateTime) -> bool {
        let mut last_alert = self.last_alert.lock().unwrap_or_else(PoisonError::into_inner);
        let last = last_alert
            .get(&kind)
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH.naive_utc());
        if now - last > self.cooldown {
            last_alert.insert(kind, now);
            true
        } else {
            false
        }
    }

    pub fn last_alert(&self, kind: MetricKind) -> Option<NaiveDateTime> {
        self.last_alert
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
    }
}

impl Default for AlertDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECONDS)
    }
}
