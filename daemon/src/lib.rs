//! HealthPulse: host health scoring and baseline anomaly alerting

pub mod collector;
pub mod config;
pub mod db;
pub mod debounce;
pub mod detector;
pub mod error;
pub mod learner;
pub mod metrics;
pub mod notifier;
pub mod profile;
pub mod protocol;
pub mod scoring;
pub mod session;
pub mod socket;
pub mod status;

pub use error::{Error, Result};
