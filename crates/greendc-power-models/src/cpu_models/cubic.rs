//! Cubic power model.

use crate::cpu::CpuPowerModel;

/// Grows the dynamic part of the power draw with the cube of utilization.
/// Compared to the linear model this stays close to idle power through the
/// mid-range, which suits hosts with aggressive low-load power management.
#[derive(Clone)]
pub struct CubicPowerModel {
    idle_power: f64,
    dynamic_range: f64,
}

impl CubicPowerModel {
    /// * `idle_power` - power draw at 0% utilization, Watts.
    /// * `full_power` - power draw at 100% utilization, Watts.
    pub fn new(idle_power: f64, full_power: f64) -> Self {
        Self {
            idle_power,
            dynamic_range: full_power - idle_power,
        }
    }
}

impl CpuPowerModel for CubicPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        self.idle_power + self.dynamic_range * utilization.powi(3)
    }
}
