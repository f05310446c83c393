//! Eviction planning for overloaded hosts.

use log::trace;

use crate::core::common::{Dimension, HostRef, VmRef};
use crate::core::overload::{common_over_utilized_hosts, OverloadPredicate};
use crate::core::vm_selection::VmSelectionPolicy;

/// The two victim lists produced by one eviction planning step.
#[derive(Default)]
pub struct EvictionPlan {
    pub cpu_victims: Vec<VmRef>,
    pub io_victims: Vec<VmRef>,
}

/// Plans evictions by simulated `vm_destroy` against the working copy of the
/// fleet: after `plan` returns, the victim VMs are removed from their origin
/// hosts and stay removed until the consolidator restores the saved
/// allocation at the end of the pass.
pub struct EvictionPlanner<'a> {
    cpu_policy: &'a dyn VmSelectionPolicy,
    io_policy: &'a dyn VmSelectionPolicy,
    cpu_predicate: &'a dyn OverloadPredicate,
    io_predicate: &'a dyn OverloadPredicate,
    weight_mips: f64,
    weight_iops: f64,
}

impl<'a> EvictionPlanner<'a> {
    pub fn new(
        cpu_policy: &'a dyn VmSelectionPolicy,
        io_policy: &'a dyn VmSelectionPolicy,
        cpu_predicate: &'a dyn OverloadPredicate,
        io_predicate: &'a dyn OverloadPredicate,
        weight_mips: f64,
        weight_iops: f64,
    ) -> Self {
        Self {
            cpu_policy,
            io_policy,
            cpu_predicate,
            io_predicate,
            weight_mips,
            weight_iops,
        }
    }

    /// Produces the victim lists for the given overload host lists.
    ///
    /// Hosts overloaded on both dimensions are relieved in two passes ordered
    /// by the resource weights: the heavier dimension is relieved first, then
    /// only the hosts still overloaded on the lighter dimension get a second
    /// round of evictions.
    pub fn plan(&self, cpu_overloaded: &[HostRef], io_overloaded: &[HostRef]) -> EvictionPlan {
        let common = common_over_utilized_hosts(cpu_overloaded, io_overloaded);
        let cpu_only = exclude_hosts(cpu_overloaded, &common);
        let io_only = exclude_hosts(io_overloaded, &common);

        let mut plan = EvictionPlan::default();

        if self.weight_mips > self.weight_iops {
            self.evict_until_relieved(&common, Dimension::Cpu, &mut plan.cpu_victims);
            let still_io = self.still_over_utilized(&common, self.io_predicate);
            self.evict_until_relieved(&still_io, Dimension::Io, &mut plan.io_victims);
        } else {
            self.evict_until_relieved(&common, Dimension::Io, &mut plan.io_victims);
            let still_cpu = self.still_over_utilized(&common, self.cpu_predicate);
            self.evict_until_relieved(&still_cpu, Dimension::Cpu, &mut plan.cpu_victims);
        }

        self.evict_until_relieved(&cpu_only, Dimension::Cpu, &mut plan.cpu_victims);
        self.evict_until_relieved(&io_only, Dimension::Io, &mut plan.io_victims);

        plan
    }

    /// For each host, keeps selecting and destroying VMs until the host
    /// leaves overload on the given dimension or the selector runs dry.
    fn evict_until_relieved(&self, hosts: &[HostRef], dimension: Dimension, victims: &mut Vec<VmRef>) {
        let (policy, predicate) = match dimension {
            Dimension::Cpu => (self.cpu_policy, self.cpu_predicate),
            Dimension::Io => (self.io_policy, self.io_predicate),
        };
        for host in hosts {
            loop {
                let selected = policy.select_vm_to_migrate(&host.borrow());
                let Some(vm) = selected else {
                    break;
                };
                let vm_id = vm.borrow().id();
                trace!("evicting vm #{} from host #{}", vm_id, host.borrow().id());
                host.borrow_mut().vm_destroy(vm_id);
                victims.push(vm);
                if !predicate.is_over_utilized(&host.borrow()) {
                    break;
                }
            }
        }
    }

    fn still_over_utilized(&self, hosts: &[HostRef], predicate: &dyn OverloadPredicate) -> Vec<HostRef> {
        hosts
            .iter()
            .filter(|host| predicate.is_over_utilized(&host.borrow()))
            .cloned()
            .collect()
    }
}

fn exclude_hosts(hosts: &[HostRef], excluded: &[HostRef]) -> Vec<HostRef> {
    hosts
        .iter()
        .filter(|host| {
            let id = host.borrow().id();
            !excluded.iter().any(|other| other.borrow().id() == id)
        })
        .cloned()
        .collect()
}
