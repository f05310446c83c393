//! Consolidation configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_WEIGHT_MIPS: f64 = 0.5;
const DEFAULT_WEIGHT_IOPS: f64 = 0.5;
const DEFAULT_OVERLOAD_THRESHOLD: f64 = 0.8;
const DEFAULT_MIN_POWER: f64 = 95.;
const DEFAULT_MAX_POWER: f64 = 250.;

/// Auxiliary structure to parse ConsolidationConfig from file.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidationConfigRaw {
    /// significance of the MIPS utilization in consolidation decisions
    pub weight_mips: Option<f64>,
    /// significance of the IOPS utilization in consolidation decisions
    pub weight_iops: Option<f64>,
    /// CPU utilization fraction above which a host counts as over-utilized
    pub cpu_overload_threshold: Option<f64>,
    /// IO utilization fraction above which a host counts as over-utilized
    pub io_overload_threshold: Option<f64>,
    /// physical hosts of the fleet
    pub hosts: Option<Vec<HostConfig>>,
}

/// Represents physical host(s) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// host CPU capacity in MIPS
    pub cpu_mips: f64,
    /// host storage capacity in IOPS
    pub io_iops: f64,
    /// host memory capacity in MB
    pub memory: u64,
    /// host power draw at idle, Watts
    pub min_power: Option<f64>,
    /// host power draw at full CPU load, Watts
    pub max_power: Option<f64>,
    /// number of such hosts
    pub count: Option<u32>,
}

impl HostConfig {
    pub fn min_power(&self) -> f64 {
        self.min_power.unwrap_or(DEFAULT_MIN_POWER)
    }

    pub fn max_power(&self) -> f64 {
        self.max_power.unwrap_or(DEFAULT_MAX_POWER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// significance of the MIPS utilization in consolidation decisions
    pub weight_mips: f64,
    /// significance of the IOPS utilization in consolidation decisions
    pub weight_iops: f64,
    /// CPU utilization fraction above which a host counts as over-utilized
    pub cpu_overload_threshold: f64,
    /// IO utilization fraction above which a host counts as over-utilized
    pub io_overload_threshold: f64,
    /// physical hosts of the fleet
    pub hosts: Vec<HostConfig>,
}

impl ConsolidationConfig {
    /// Returns total hosts count.
    pub fn number_of_hosts(&self) -> u32 {
        self.hosts.iter().map(|host| host.count.unwrap_or(1)).sum()
    }

    /// Creates consolidation config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: ConsolidationConfigRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));

        Self {
            weight_mips: raw.weight_mips.unwrap_or(DEFAULT_WEIGHT_MIPS),
            weight_iops: raw.weight_iops.unwrap_or(DEFAULT_WEIGHT_IOPS),
            cpu_overload_threshold: raw.cpu_overload_threshold.unwrap_or(DEFAULT_OVERLOAD_THRESHOLD),
            io_overload_threshold: raw.io_overload_threshold.unwrap_or(DEFAULT_OVERLOAD_THRESHOLD),
            hosts: raw.hosts.unwrap_or_default(),
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            weight_mips: DEFAULT_WEIGHT_MIPS,
            weight_iops: DEFAULT_WEIGHT_IOPS,
            cpu_overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
            io_overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
            hosts: Vec::new(),
        }
    }
}
