//! Host power model.

use crate::cpu::CpuPowerModel;
use crate::cpu_models::linear::LinearPowerModel;

/// A model for estimating the power consumption of a physical host.
///
/// The host power consumption is modeled as two parts:
/// - CPU consumption estimated using the provided CPU power model,
/// - consumption of other host components modeled as a fixed value.
///
/// Utilization outside the [0, 1] range yields `f64::NAN`; callers must treat
/// a non-finite result as a failed power computation.
#[derive(Clone)]
pub struct HostPowerModel {
    cpu_power_model: Box<dyn CpuPowerModel>,
    other_power: f64,
    zero_idle_power: bool,
}

impl HostPowerModel {
    /// Creates the host power model.
    ///
    /// * `cpu_power_model` - The model for the CPU power consumption part.
    /// * `other_power` - Fixed power consumption of other host components in Watts.
    /// * `zero_idle_power` - Assume no power consumption when idle (powered off).
    pub fn new(cpu_power_model: Box<dyn CpuPowerModel>, other_power: f64, zero_idle_power: bool) -> Self {
        Self {
            cpu_power_model,
            other_power,
            zero_idle_power,
        }
    }

    /// Creates the host power model using only the CPU power consumption part.
    pub fn cpu_only(cpu_power_model: Box<dyn CpuPowerModel>) -> Self {
        Self::new(cpu_power_model, 0., false)
    }

    /// Returns the power consumption of a host in Watts for the given CPU utilization.
    pub fn get_power(&self, utilization: f64) -> f64 {
        if !(0.0..=1.0).contains(&utilization) {
            return f64::NAN;
        }
        if utilization == 0. && self.zero_idle_power {
            return 0.;
        }
        self.cpu_power_model.get_power(utilization) + self.other_power
    }
}

impl Default for HostPowerModel {
    fn default() -> Self {
        Self::cpu_only(Box::new(LinearPowerModel::new(0., 0.)))
    }
}
