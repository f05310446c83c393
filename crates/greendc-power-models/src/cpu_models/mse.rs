//! Calibrated non-linear power model.

use crate::cpu::CpuPowerModel;

/// The calibrated model of Fan et al. (ISCA 2007): the dynamic part of the
/// power draw grows as `2u - u^r`, rising faster than linearly at low
/// utilization the way real servers do. The exponent `r` is calibrated
/// against measured power draw; 1.4 minimized the mean squared error in the
/// original measurements and is the default here.
#[derive(Clone)]
pub struct MsePowerModel {
    idle_power: f64,
    dynamic_range: f64,
    exponent: f64,
}

impl MsePowerModel {
    /// Creates the model with the default calibration exponent of 1.4.
    ///
    /// * `idle_power` - power draw at 0% utilization, Watts.
    /// * `full_power` - power draw at 100% utilization, Watts.
    pub fn new(idle_power: f64, full_power: f64) -> Self {
        Self::with_exponent(idle_power, full_power, 1.4)
    }

    /// Creates the model with an exponent calibrated for a specific server.
    pub fn with_exponent(idle_power: f64, full_power: f64, exponent: f64) -> Self {
        Self {
            idle_power,
            dynamic_range: full_power - idle_power,
            exponent,
        }
    }
}

impl CpuPowerModel for MsePowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        let shape = 2. * utilization - utilization.powf(self.exponent);
        self.idle_power + self.dynamic_range * shape
    }
}
