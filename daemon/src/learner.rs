//! Baseline learning from recorded history

use crate::db::Database;
use crate::error::Result;
use crate::metrics::{HistoryRow, MetricKind};
use crate::profile::{BaselineProfile, Context, MetricStats, WorkSchedule};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub struct Learner {
    schedule: WorkSchedule,
}

impl Learner {
    pub fn new(schedule: WorkSchedule) -> Self {
        Self { schedule }
    }

    /// Splits history into `(work_hours, off_hours)`, preserving order.
    pub fn partition<'a>(&self, history: &'a [HistoryRow]) -> (Vec<&'a HistoryRow>, Vec<&'a HistoryRow>) {
        history
            .iter()
            .partition(|row| self.schedule.context_for(&row.timestamp) == Context::WorkHours)
    }

    /// Builds a profile from `history` (oldest first). A context with no
    /// readings for a kind simply has no entry for it.
    pub fn build(&self, history: &[HistoryRow], created_at: NaiveDateTime) -> BaselineProfile {
        let (work, off) = self.partition(history);

        let mut contexts = BTreeMap::new();
        for (context, rows) in [(Context::WorkHours, work), (Context::OffHours, off)] {
            let stats: BTreeMap<_, _> = MetricKind::ALL
                .iter()
                .filter_map(|&kind| {
                    let values: Vec<f64> = rows.iter().filter_map(|r| r.value(kind)).collect();
                    sample_stats(&values).map(|s| (kind, s))
                })
                .collect();
            contexts.insert(context, stats);
        }

        BaselineProfile {
            contexts,
            battery_drain_per_minute: battery_drain_per_minute(history),
            created_at,
        }
    }
}

/// Mean and sample (n-1) standard deviation; a single value has std 0.
fn sample_stats(values: &[f64]) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let avg = values.iter().sum::<f64>() / n;
    let std = if values.len() < 2 {
        0.0
    } else {
        let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    };
    Some(MetricStats { avg, std })
}

/// Average percentage points lost per minute while on battery. Each pair
/// of log-adjacent discharging rows contributes its drop divided by the
/// minutes between the two timestamps, so the result does not depend on the
/// logger interval.
///
/// Pairs that straddle a charging or battery-less row are skipped, as are
/// pairs whose timestamps do not move forward. Logger downtime between two
/// adjacent rows is averaged over the whole gap.
fn battery_drain_per_minute(history: &[HistoryRow]) -> Option<f64> {
    let discharging: Vec<(usize, NaiveDateTime, f64)> = history
        .iter()
        .enumerate()
        .filter(|(_, row)| row.is_discharging())
        .filter_map(|(i, row)| row.battery.map(|b| (i, row.timestamp, b)))
        .collect();

    if discharging.len() < 2 {
        return None;
    }

    let rates: Vec<f64> = discharging
        .windows(2)
        .filter(|pair| pair[1].0 == pair[0].0 + 1)
        .filter_map(|pair| {
            let (_, prev_ts, prev_level) = pair[0];
            let (_, ts, level) = pair[1];
            let minutes = (ts - prev_ts).num_milliseconds() as f64 / 60_000.0;
            (minutes > 0.0).then(|| (prev_level - level) / minutes)
        })
        .collect();

    if rates.is_empty() {
        return None;
    }
    Some(rates.iter().sum::<f64>() / rates.len() as f64)
}

/// Reads recent history from the database at `db_path`, builds a fresh
/// profile and writes it to `profile_path`. Opens its own connection so it
/// can run on a blocking worker next to the live loop.
pub fn rebuild_profile(
    db_path: &Path,
    profile_path: &Path,
    schedule: WorkSchedule,
    history_limit: u32,
    now: NaiveDateTime,
) -> Result<Option<BaselineProfile>> {
    let db = Database::open(db_path)?;
    db.init_schema()?;
    let history = db.get_recent_history(history_limit)?;
    if history.is_empty() {
        info!("No history recorded yet, skipping baseline build");
        return Ok(None);
    }

    let learner = Learner::new(schedule);
    let (work, off) = learner.partition(&history);
    info!(
        "Building baseline from {} rows ({} work hours, {} off hours)",
        history.len(),
        work.len(),
        off.len()
    );

    let profile = learner.build(&history, now);
    profile.save(profile_path)?;
    info!("Baseline profile written to {:?}", profile_path);
    Ok(Some(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn row(ts: NaiveDateTime, cpu: f64) -> HistoryRow {
        let mut r = HistoryRow::new(ts);
        r.cpu = Some(cpu);
        r.memory = Some(cpu / 2.0);
        r
    }

    fn battery_row(ts: NaiveDateTime, level: Option<f64>, charging: Option<bool>) -> HistoryRow {
        let mut r = HistoryRow::new(ts);
        r.battery = level;
        r.is_charging = charging;
        r
    }

    #[test]
    fn test_sample_stats() {
        let s = sample_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((s.avg - 5.0).abs() < 1e-9);
        // sum of squares 32, n-1 = 7
        assert!((s.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
        assert_eq!(sample_stats(&[]), None);
        assert_eq!(sample_stats(&[3.0]), Some(MetricStats { avg: 3.0, std: 0.0 }));
    }

    #[test]
    fn test_build_partitions_by_context() {
        let learner = Learner::new(WorkSchedule { work_days: vec![0, 1, 2, 3, 4], ..WorkSchedule::default() });
        // Monday 09:00 and 10:00 are work hours, Saturday 09:00 is not.
        let history = vec![row(at(4, 9, 0), 40.0), row(at(4, 10, 0), 60.0), row(at(9, 9, 0), 10.0)];
        let profile = learner.build(&history, at(10, 0, 0));

        let work = profile.stats(Context::WorkHours, MetricKind::Cpu).unwrap();
        assert!((work.avg - 50.0).abs() < 1e-9);
        assert!((work.std - 200.0f64.sqrt()).abs() < 1e-9);

        let off = profile.stats(Context::OffHours, MetricKind::Cpu).unwrap();
        assert_eq!(off, MetricStats { avg: 10.0, std: 0.0 });
        assert_eq!(profile.stats(Context::OffHours, MetricKind::Battery), None);
        assert_eq!(profile.created_at, at(10, 0, 0));
    }

    #[test]
    fn test_default_schedule_puts_saturday_morning_in_work_hours() {
        let learner = Learner::new(WorkSchedule::default());
        let history = vec![row(at(4, 9, 0), 40.0), row(at(9, 9, 0), 10.0), row(at(9, 3, 0), 5.0)];
        let (work, off) = learner.partition(&history);
        assert_eq!(work.len(), 2);
        assert_eq!(off.len(), 1);
    }

    #[test]
    fn test_empty_partition_has_no_entries() {
        let learner = Learner::new(WorkSchedule::default());
        let profile = learner.build(&[row(at(4, 12, 0), 30.0)], at(4, 13, 0));
        assert!(profile.stats(Context::OffHours, MetricKind::Cpu).is_none());
        assert!(profile.contexts[&Context::OffHours].is_empty());
    }

    #[test]
    fn test_battery_drain_averages_adjacent_discharging_rows() {
        let start = at(4, 12, 0);
        let history: Vec<_> = [100.0, 99.0, 97.0, 96.0]
            .iter()
            .enumerate()
            .map(|(i, &lvl)| battery_row(start + Duration::minutes(i as i64), Some(lvl), Some(false)))
            .collect();
        let drain = battery_drain_per_minute(&history).unwrap();
        assert!((drain - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_battery_drain_skips_charging_gaps() {
        let start = at(4, 12, 0);
        let history = vec![
            battery_row(start, Some(80.0), Some(false)),
            battery_row(start + Duration::minutes(1), Some(79.0), Some(false)),
            battery_row(start + Duration::minutes(2), Some(85.0), Some(true)),
            battery_row(start + Duration::minutes(3), Some(90.0), Some(false)),
            battery_row(start + Duration::minutes(4), Some(88.0), Some(false)),
        ];
        // Only 80->79 and 90->88 are adjacent pairs.
        let drain = battery_drain_per_minute(&history).unwrap();
        assert!((drain - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_battery_drain_absent_without_two_rows() {
        let start = at(4, 12, 0);
        assert_eq!(battery_drain_per_minute(&[]), None);
        assert_eq!(battery_drain_per_minute(&[battery_row(start, Some(50.0), Some(false))]), None);
        let charging = vec![
            battery_row(start, Some(50.0), Some(true)),
            battery_row(start + Duration::minutes(1), Some(51.0), Some(true)),
        ];
        assert_eq!(battery_drain_per_minute(&charging), None);
        let no_battery = vec![
            battery_row(start, None, None),
            battery_row(start + Duration::minutes(1), None, None),
        ];
        assert_eq!(battery_drain_per_minute(&no_battery), None);
    }

    #[test]
    fn test_battery_drain_uses_row_spacing() {
        // Logger every 30 s, one point lost per row: two points a minute.
        let start = at(4, 12, 0);
        let history: Vec<_> = (0..11)
            .map(|i| battery_row(start + Duration::seconds(30 * i), Some(90.0 - i as f64), Some(false)))
            .collect();
        let drain = battery_drain_per_minute(&history).unwrap();
        assert!((drain - 2.0).abs() < 1e-9);

        // A five minute gap between two rows spreads the drop over the gap.
        let gapped = vec![
            battery_row(start, Some(80.0), Some(false)),
            battery_row(start + Duration::minutes(5), Some(75.0), Some(false)),
        ];
        assert!((battery_drain_per_minute(&gapped).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_battery_drain_ignores_duplicate_timestamps() {
        let start = at(4, 12, 0);
        let history = vec![
            battery_row(start, Some(80.0), Some(false)),
            battery_row(start, Some(79.0), Some(false)),
        ];
        assert_eq!(battery_drain_per_minute(&history), None);
    }
}
