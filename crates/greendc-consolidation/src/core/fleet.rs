//! Fleet-wide views and utilization accounting.

use std::cell::RefCell;
use std::rc::Rc;

use greendc_power_models::cpu_models::linear::LinearPowerModel;
use greendc_power_models::host::HostPowerModel;

use crate::core::common::HostRef;
use crate::core::config::ConsolidationConfig;
use crate::core::host::Host;
use crate::core::vm::VirtualMachine;

/// Relative CPU cost of receiving a VM over the live-migration protocol:
/// while the migration runs, the VM consumes 10x its allocated MIPS.
const MIGRATION_CPU_OVERHEAD: f64 = 0.9 / 0.1;

/// Read access to the ordered host fleet.
///
/// Hosts keep their insertion order and every scan iterates in that order,
/// which makes all tie-breaks in the planner deterministic.
pub struct FleetView {
    hosts: Vec<HostRef>,
}

impl FleetView {
    pub fn new(hosts: Vec<HostRef>) -> Self {
        Self { hosts }
    }

    /// Builds a fleet from the host shapes of the configuration, assigning
    /// sequential host ids starting from 1.
    pub fn from_config(config: &ConsolidationConfig) -> Self {
        let mut hosts = Vec::new();
        let mut id = 1;
        for host_config in &config.hosts {
            for _ in 0..host_config.count.unwrap_or(1) {
                let power_model = HostPowerModel::new(
                    Box::new(LinearPowerModel::new(host_config.min_power(), host_config.max_power())),
                    0.,
                    true,
                );
                hosts.push(Rc::new(RefCell::new(Host::new(
                    id,
                    host_config.cpu_mips,
                    host_config.io_iops,
                    host_config.memory,
                    power_model,
                ))));
                id += 1;
            }
        }
        Self::new(hosts)
    }

    pub fn hosts(&self) -> &[HostRef] {
        &self.hosts
    }

    pub fn host(&self, id: u32) -> Option<&HostRef> {
        self.hosts.iter().find(|host| host.borrow().id() == id)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Hosts with zero utilization on both dimensions. A host idle on CPU but
    /// still serving I/O is not switched off.
    pub fn switched_off_hosts(&self) -> Vec<HostRef> {
        self.hosts
            .iter()
            .filter(|host| {
                let host = host.borrow();
                host.cpu_utilization() == 0. && host.io_utilization() == 0.
            })
            .cloned()
            .collect()
    }

    /// Host CPU usage in MIPS, counting the extra CPU consumed by the
    /// live-migration protocol for VMs that are migrating in.
    pub fn utilization_of_cpu_mips(&self, host: &Host) -> f64 {
        let mut total = 0.;
        for vm in host.vms() {
            let allocated = host.allocated_mips_for_vm(vm.borrow().id());
            if host.is_migrating_in(vm.borrow().id()) {
                total += allocated * MIGRATION_CPU_OVERHEAD;
            }
            total += allocated;
        }
        total
    }

    /// Host IO usage in IOPS.
    pub fn utilization_of_iops(&self, host: &Host) -> f64 {
        host.vms()
            .map(|vm| host.allocated_iops_for_vm(vm.borrow().id()))
            .sum()
    }

    /// Projected CPU utilization fraction if `vm` were added to `host`.
    /// May exceed 1; the power model decides whether that is admissible.
    pub fn max_utilization_after_allocation(&self, host: &Host, vm: &VirtualMachine) -> f64 {
        (self.utilization_of_cpu_mips(host) + vm.cpu_mips()) / host.cpu_total_mips()
    }
}
