//! SQLite storage for metric history and events

use crate::metrics::HistoryRow;
use chrono::{Local, NaiveDateTime, TimeDelta};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub event_type: String,
    pub message: Option<String>,
}

impl Database {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(include_str!("../schema.sql"))
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    pub fn insert_metric(&self, row: &HistoryRow) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO metrics (timestamp, cpu_load, memory_usage, disk_usage, battery_percentage,
                                  temperature, is_charging, top_process_name, top_process_cpu)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.timestamp,
                row.cpu,
                row.memory,
                row.disk,
                row.battery,
                row.temperature,
                row.is_charging,
                row.top_process_name,
                row.top_process_cpu,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The newest `limit` rows, returned oldest first.
    pub fn get_recent_history(&self, limit: u32) -> rusqlite::Result<Vec<HistoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, cpu_load, memory_usage, disk_usage, battery_percentage,
                    temperature, is_charging, top_process_name, top_process_cpu
             FROM metrics ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::map_history)?;
        let mut history = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        history.reverse();
        Ok(history)
    }

    fn map_history(row: &rusqlite::Row) -> rusqlite::Result<HistoryRow> {
        Ok(HistoryRow {
            timestamp: row.get(0)?,
            cpu: row.get(1)?,
            memory: row.get(2)?,
            disk: row.get(3)?,
            battery: row.get(4)?,
            temperature: row.get(5)?,
            is_charging: row.get::<_, Option<i32>>(6)?.map(|v| v != 0),
            top_process_name: row.get(7)?,
            top_process_cpu: row.get(8)?,
        })
    }

    pub fn count_metrics(&self) -> rusqlite::Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    }

    pub fn insert_event(&self, event_type: &str, message: &str) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO events (timestamp, event_type, message) VALUES (?1, ?2, ?3)",
            params![Self::now(), event_type, message],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_events(&self, limit: u32) -> rusqlite::Result<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, event_type, message FROM events ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(EventRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                message: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Drops metrics and events older than `retention_days`. Returns the
    /// number of metric rows removed.
    pub fn cleanup_old_data(&self, retention_days: u32) -> rusqlite::Result<usize> {
        let cutoff = Self::now() - TimeDelta::days(retention_days as i64);
        let removed = self.conn.execute("DELETE FROM metrics WHERE timestamp < ?1", params![cutoff])?;
        self.conn.execute("DELETE FROM events WHERE timestamp < ?1", params![cutoff])?;
        Ok(removed)
    }
}
