//! Power-minimizing placement search.

use std::collections::HashSet;

use crate::core::common::{HostRef, VmRef};
use crate::core::fleet::FleetView;
use crate::core::overload::OverloadPredicate;

/// Scans the fleet for the cheapest host, by incremental power draw, that can
/// take a VM without being pushed straight back into overload.
pub struct PlacementSearch<'a> {
    fleet: &'a FleetView,
    cpu_predicate: &'a dyn OverloadPredicate,
    io_predicate: &'a dyn OverloadPredicate,
}

impl<'a> PlacementSearch<'a> {
    pub fn new(
        fleet: &'a FleetView,
        cpu_predicate: &'a dyn OverloadPredicate,
        io_predicate: &'a dyn OverloadPredicate,
    ) -> Self {
        Self {
            fleet,
            cpu_predicate,
            io_predicate,
        }
    }

    /// Finds the best host for the VM, skipping `excluded_hosts` (by host id).
    ///
    /// Among qualifying hosts the one with the minimum power increment wins;
    /// ties go to the host earliest in fleet iteration order.
    pub fn find_host_for_vm(&self, vm: &VmRef, excluded_hosts: &HashSet<u32>) -> Option<HostRef> {
        let mut min_power_diff = f64::MAX;
        let mut best: Option<HostRef> = None;

        for host in self.fleet.hosts() {
            if excluded_hosts.contains(&host.borrow().id()) {
                continue;
            }
            if !host.borrow().is_suitable_for_vm(&vm.borrow()) {
                continue;
            }
            // A host already loaded on both dimensions must not be pushed
            // back into overload; an entirely idle dimension means the host
            // is always worth considering.
            let loaded = {
                let host = host.borrow();
                self.fleet.utilization_of_cpu_mips(&host) > 0. && self.fleet.utilization_of_iops(&host) > 0.
            };
            if loaded && self.is_over_utilized_after_allocation(host, vm) {
                continue;
            }

            let power_after = {
                let host = host.borrow();
                let utilization = self.fleet.max_utilization_after_allocation(&host, &vm.borrow());
                host.power_model().get_power(utilization)
            };
            if !power_after.is_finite() || power_after < 0. {
                continue;
            }

            let power_diff = power_after - host.borrow().current_power();
            if power_diff < min_power_diff {
                min_power_diff = power_diff;
                best = Some(host.clone());
            }
        }
        best
    }

    /// Hypothetically creates the VM on the host and re-runs both overload
    /// predicates. The host is always left exactly as it was found.
    pub fn is_over_utilized_after_allocation(&self, host: &HostRef, vm: &VmRef) -> bool {
        if !host.borrow_mut().vm_create(vm.clone()) {
            return true;
        }
        let over_utilized = {
            let host = host.borrow();
            self.cpu_predicate.is_over_utilized(&host) || self.io_predicate.is_over_utilized(&host)
        };
        host.borrow_mut().vm_destroy(vm.borrow().id());
        over_utilized
    }
}
