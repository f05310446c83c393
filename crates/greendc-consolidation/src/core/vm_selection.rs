//! VM selection policies for evicting load from an overloaded host.

use std::cell::RefCell;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::core::common::VmRef;
use crate::core::host::Host;

/// Picks which VM should leave the given host next.
pub trait VmSelectionPolicy {
    /// Returns the next VM to migrate away, or `None` when the host has no
    /// eligible VM left. VMs already in migration are never eligible.
    fn select_vm_to_migrate(&self, host: &Host) -> Option<VmRef>;
}

fn migratable_vms(host: &Host) -> Vec<VmRef> {
    host.vms()
        .filter(|vm| !vm.borrow().is_in_migration())
        .cloned()
        .collect()
}

/// Evicts the VM with the smallest memory footprint first: migration time is
/// proportional to the memory that must be copied over the network.
pub struct MinimumMigrationTime;

impl VmSelectionPolicy for MinimumMigrationTime {
    fn select_vm_to_migrate(&self, host: &Host) -> Option<VmRef> {
        migratable_vms(host)
            .into_iter()
            .min_by_key(|vm| vm.borrow().memory())
    }
}

/// Picks an eligible VM uniformly at random. Seeded, so selections are
/// reproducible across simulation runs.
pub struct RandomVmSelection {
    rng: RefCell<Pcg64>,
}

impl RandomVmSelection {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(Pcg64::seed_from_u64(seed)),
        }
    }
}

impl VmSelectionPolicy for RandomVmSelection {
    fn select_vm_to_migrate(&self, host: &Host) -> Option<VmRef> {
        let vms = migratable_vms(host);
        if vms.is_empty() {
            return None;
        }
        let index = self.rng.borrow_mut().gen_range(0..vms.len());
        Some(vms[index].clone())
    }
}

/// IO-side policy: evicts the VM with the largest weighted share of the host
/// capacities, combining both utilization dimensions into one score.
pub struct WeightedMaximumUtilization {
    weight_mips: f64,
    weight_iops: f64,
}

impl WeightedMaximumUtilization {
    pub fn new(weight_mips: f64, weight_iops: f64) -> Self {
        Self {
            weight_mips,
            weight_iops,
        }
    }

    fn score(&self, host: &Host, vm: &VmRef) -> f64 {
        let vm = vm.borrow();
        self.weight_mips * vm.cpu_mips() / host.cpu_total_mips()
            + self.weight_iops * vm.io_iops() / host.io_total_iops()
    }
}

impl VmSelectionPolicy for WeightedMaximumUtilization {
    fn select_vm_to_migrate(&self, host: &Host) -> Option<VmRef> {
        let mut best: Option<VmRef> = None;
        let mut best_score = f64::MIN;
        for vm in migratable_vms(host) {
            let score = self.score(host, &vm);
            if score > best_score {
                best_score = score;
                best = Some(vm);
            }
        }
        best
    }
}
