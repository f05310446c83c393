//! Host overload detection.

use crate::core::common::HostRef;
use crate::core::fleet::FleetView;
use crate::core::host::Host;

/// Minimum number of utilization samples required before an adaptive detector
/// trusts its statistics and stops using the fallback threshold.
const MIN_HISTORY_LENGTH: usize = 10;

/// Per-dimension host overload predicate.
///
/// Implementations must be deterministic functions of the host's current
/// observable state, so that eviction planning can re-query the predicate
/// after each simulated `vm_destroy` and get a consistent reading.
pub trait OverloadPredicate {
    fn is_over_utilized(&self, host: &Host) -> bool;

    /// Detector-specific value recorded into the metric history,
    /// e.g. the effective utilization threshold.
    fn metric(&self, host: &Host) -> f64;
}

/// Filters the fleet by the predicate, preserving fleet iteration order.
pub fn over_utilized_hosts(fleet: &FleetView, predicate: &dyn OverloadPredicate) -> Vec<HostRef> {
    fleet
        .hosts()
        .iter()
        .filter(|host| predicate.is_over_utilized(&host.borrow()))
        .cloned()
        .collect()
}

/// Hosts overloaded on both dimensions, iterated in the order of `io_hosts`.
pub fn common_over_utilized_hosts(cpu_hosts: &[HostRef], io_hosts: &[HostRef]) -> Vec<HostRef> {
    io_hosts
        .iter()
        .filter(|host| {
            let id = host.borrow().id();
            cpu_hosts.iter().any(|cpu_host| cpu_host.borrow().id() == id)
        })
        .cloned()
        .collect()
}

/// Fixed CPU utilization threshold.
pub struct StaticCpuThreshold {
    threshold: f64,
}

impl StaticCpuThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl OverloadPredicate for StaticCpuThreshold {
    fn is_over_utilized(&self, host: &Host) -> bool {
        host.cpu_utilization() > self.threshold
    }

    fn metric(&self, _host: &Host) -> f64 {
        self.threshold
    }
}

/// Fixed IO utilization threshold.
pub struct StaticIoThreshold {
    threshold: f64,
}

impl StaticIoThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl OverloadPredicate for StaticIoThreshold {
    fn is_over_utilized(&self, host: &Host) -> bool {
        host.io_utilization() > self.threshold
    }

    fn metric(&self, _host: &Host) -> f64 {
        self.threshold
    }
}

/// Adaptive CPU threshold `1 - s * MAD`, where MAD is the median absolute
/// deviation of the host's observed CPU utilization and `s` is a safety
/// parameter (lower values make consolidation more aggressive).
///
/// Falls back to a static threshold until enough samples are observed.
pub struct MadCpuThreshold {
    safety_parameter: f64,
    fallback_threshold: f64,
}

impl MadCpuThreshold {
    pub fn new(safety_parameter: f64, fallback_threshold: f64) -> Self {
        Self {
            safety_parameter,
            fallback_threshold,
        }
    }

    fn effective_threshold(&self, host: &Host) -> f64 {
        let history = host.cpu_utilization_history();
        if history.len() < MIN_HISTORY_LENGTH {
            return self.fallback_threshold;
        }
        1. - self.safety_parameter * median_absolute_deviation(history)
    }
}

impl OverloadPredicate for MadCpuThreshold {
    fn is_over_utilized(&self, host: &Host) -> bool {
        host.cpu_utilization() > self.effective_threshold(host)
    }

    fn metric(&self, host: &Host) -> f64 {
        self.effective_threshold(host)
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.
    } else {
        values[mid]
    }
}

fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(&mut values.to_vec());
    let mut deviations: Vec<f64> = values.iter().map(|value| (value - center).abs()).collect();
    median(&mut deviations)
}
