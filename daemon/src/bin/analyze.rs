//! Builds the baseline profile from recorded history and exits.

use anyhow::Result;
use chrono::Local;
use healthpulse_daemon::{config::Config, learner};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load_or_default(&Config::config_path());
    let db_path = Config::database_path();
    let profile_path = Config::profile_path();
    info!("Analyzing history in {:?}", db_path);

    let now = Local::now().naive_local();
    let Some(profile) = learner::rebuild_profile(
        &db_path,
        &profile_path,
        config.baseline.schedule(),
        config.general.history_limit,
        now,
    )?
    else {
        warn!("No history in {:?}; run the daemon for a while first", db_path);
        return Ok(());
    };

    for (context, stats) in &profile.contexts {
        if stats.is_empty() {
            info!("{}: no samples", context.as_str());
        }
        for (kind, s) in stats {
            info!("{} {}: avg {:.1}, std {:.1}", context.as_str(), kind, s.avg, s.std);
        }
    }
    match profile.battery_drain_per_minute {
        Some(drain) => info!("Battery drain: {:.2}% per minute on battery", drain),
        None => info!("Battery drain: not enough discharging samples"),
    }
    Ok(())
}
