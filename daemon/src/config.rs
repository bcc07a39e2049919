//! Configuration management (TOML)

use crate::debounce::DEFAULT_COOLDOWN_SECONDS;
use crate::error::{Error, Result};
use crate::metrics::MetricKind;
use crate::profile::WorkSchedule;
use crate::scoring::WeightTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub weights: WeightTable,
    pub baseline: BaselineConfig,
    pub anomaly: AnomalyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Seconds between live score updates.
    pub display_interval_secs: u64,
    /// Seconds between history rows written to the database.
    pub logger_interval_secs: u64,
    pub notifications: bool,
    /// Most recent rows considered when building a baseline.
    pub history_limit: u32,
    pub retention_days: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            display_interval_secs: 2,
            logger_interval_secs: 60,
            notifications: true,
            history_limit: 10_000,
            retention_days: 30,
        }
    }
}

/// Work-hours schedule used to split history, plus when to relearn it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// 0 = Monday .. 6 = Sunday
    pub work_days: Vec<u32>,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub rebuild_on_startup: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        let schedule = WorkSchedule::default();
        BaselineConfig {
            work_days: schedule.work_days,
            work_start_hour: schedule.work_start_hour,
            work_end_hour: schedule.work_end_hour,
            rebuild_on_startup: true,
        }
    }
}

impl BaselineConfig {
    pub fn schedule(&self) -> WorkSchedule {
        WorkSchedule {
            work_days: self.work_days.clone(),
            work_start_hour: self.work_start_hour,
            work_end_hour: self.work_end_hour,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub enabled: bool,
    /// Alert when a value exceeds `avg + sigma * std`.
    pub sigma: f64,
    pub fallback_avg: f64,
    pub fallback_std: f64,
    pub cooldown_seconds: u64,
    pub monitored: Vec<MetricKind>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            enabled: true,
            sigma: 2.0,
            fallback_avg: 50.0,
            fallback_std: 15.0,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            monitored: vec![MetricKind::Cpu],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the scorer and scheduler cannot work with. Missing
    /// keys are already filled with defaults at this point.
    pub fn validate(&self) -> Result<()> {
        for kind in MetricKind::ALL {
            let weight = self.weights.weight(kind);
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::InvalidConfig(format!("weight for {} must be in [0, 1], got {}", kind, weight)));
            }
        }

        let baseline = &self.baseline;
        if let Some(day) = baseline.work_days.iter().find(|&&day| day > 6) {
            return Err(Error::InvalidConfig(format!("work day {} is out of range 0-6", day)));
        }
        if baseline.work_end_hour > 24 || baseline.work_start_hour >= baseline.work_end_hour {
            return Err(Error::InvalidConfig(format!(
                "work hours {}-{} are empty or out of range",
                baseline.work_start_hour, baseline.work_end_hour
            )));
        }

        let anomaly = &self.anomaly;
        if !(anomaly.sigma >= 0.0 && anomaly.sigma.is_finite()) {
            return Err(Error::InvalidConfig(format!("sigma must be a non-negative number, got {}", anomaly.sigma)));
        }
        if !(anomaly.fallback_std >= 0.0 && anomaly.fallback_avg.is_finite()) {
            return Err(Error::InvalidConfig("fallback_avg must be finite and fallback_std non-negative".to_string()));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Config::default();
        }
        Config::load(path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("", "", "healthpulse")
    }

    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Directory holding the history database and the learned profile.
    pub fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn database_path() -> PathBuf {
        Self::data_dir().join("health_data.db")
    }

    pub fn profile_path() -> PathBuf {
        Self::data_dir().join("profile.json")
    }
}
