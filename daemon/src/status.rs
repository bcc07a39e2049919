//! Status bands for the composite health score

use serde::{Deserialize, Serialize};

/// Declared worst-first so the derived ordering is the severity ordering:
/// `Excellent > Good > Fair > Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusBand {
    Critical,
    Fair,
    Good,
    Excellent,
}

impl StatusBand {
    /// Lower bounds are exclusive: a score of exactly 80.0 is `Good`.
    pub fn classify(score: f64) -> Self {
        if score > 80.0 {
            StatusBand::Excellent
        } else if score > 60.0 {
            StatusBand::Good
        } else if score > 40.0 {
            StatusBand::Fair
        } else {
            StatusBand::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusBand::Excellent => "EXCELLENT",
            StatusBand::Good => "GOOD",
            StatusBand::Fair => "FAIR",
            StatusBand::Critical => "CRITICAL",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            StatusBand::Excellent => "#27ae60",
            StatusBand::Good => "#f39c12",
            StatusBand::Fair => "#e67e22",
            StatusBand::Critical => "#e74c3c",
        }
    }

    /// Displays should blink the score while in this band.
    pub fn blinks(&self) -> bool {
        matches!(self, StatusBand::Critical)
    }
}
