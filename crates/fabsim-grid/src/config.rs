//! Simulation configuration.

use serde::{Deserialize, Serialize};

/// Intervals of the periodic simulation processes, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Delay between transfer progress updates.
    #[serde(default = "default_transfer_update_interval")]
    pub transfer_update_interval: f64,
    /// Delay between download progress updates.
    #[serde(default = "default_download_update_interval")]
    pub download_update_interval: f64,
    /// Delay between expiration sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval: f64,
    /// Length of one billing cycle.
    #[serde(default = "default_billing_period")]
    pub billing_period: f64,
    /// Delay between activity gauge samples.
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval: f64,
}

fn default_transfer_update_interval() -> f64 {
    10.
}

fn default_download_update_interval() -> f64 {
    10.
}

fn default_reaper_interval() -> f64 {
    300.
}

fn default_billing_period() -> f64 {
    30. * 24. * 3600.
}

fn default_monitoring_interval() -> f64 {
    3600.
}

impl Default for SimConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

impl SimConfig {
    /// Creates the configuration from the specified YAML file.
    /// Missing fields fall back to the defaults.
    pub fn from_file(file_name: &str) -> Self {
        let content =
            std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        serde_yaml::from_str(&content).unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name))
    }
}
