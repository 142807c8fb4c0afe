use serde::{Deserialize, Serialize};

pub const MIN_TICK_INTERVAL_MS: u64 = 50;
pub const MAX_TICK_INTERVAL_MS: u64 = 2000;

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_diff_threshold() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick cadence of the pipeline driver.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Scores at or below this skip recognition and translation.
    /// Empirical default, not derived; tune per content.
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            diff_threshold: default_diff_threshold(),
        }
    }
}

impl SchedulerConfig {
    pub fn clamp(&mut self) {
        self.tick_interval_ms = self
            .tick_interval_ms
            .clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS);
        if !self.diff_threshold.is_finite() || self.diff_threshold < 0.0 {
            self.diff_threshold = default_diff_threshold();
        }
    }
}
