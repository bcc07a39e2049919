//! IPC protocol definitions (JSON messages)

use crate::collector::SystemInfo;
use crate::config::Config;
use crate::detector::AnomalySignal;
use crate::metrics::MetricSet;
use crate::status::StatusBand;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    GetStatus,
    GetSystemInfo,
    GetHistory { params: LimitParams },
    GetEvents { params: LimitParams },
    GetProfile,
    RebuildProfile,
    GetConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { id: Option<String>, data: serde_json::Value },
    Error { message: String },
    Status { data: StatusData },
    Alert { data: AlertData },
    SystemInfo { data: SystemInfo },
    Config { data: Box<Config> },
}

impl Response {
    pub fn data(data: serde_json::Value) -> Self {
        Response::Response { id: None, data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}

/// Everything a display needs to redraw after one sampling tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub timestamp: NaiveDateTime,
    pub score: f64,
    pub status: StatusBand,
    pub color: String,
    pub blink: bool,
    pub metrics: MetricSet,
    pub has_battery: bool,
    pub has_temperature: bool,
    pub profile_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertData {
    #[serde(flatten)]
    pub signal: AnomalySignal,
    pub message: String,
    pub top_process: Option<String>,
}
