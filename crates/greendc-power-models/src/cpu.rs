//! CPU power model trait.

use dyn_clone::{clone_trait_object, DynClone};

/// Estimates CPU power draw from utilization. Doubles as a whole-host model
/// when CPU is the only component worth modeling.
pub trait CpuPowerModel: DynClone {
    /// Power draw in Watts at the given utilization fraction (0 to 1).
    fn get_power(&self, utilization: f64) -> f64;
}

clone_trait_object!(CpuPowerModel);
