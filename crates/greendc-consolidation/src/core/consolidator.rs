//! Top-level consolidation control loop.

use std::collections::HashSet;
use std::time::Instant;

use log::{debug, trace};

use crate::core::common::{Dimension, HostRef, MigrationMap, Placement, VmRef};
use crate::core::error::ConsolidationError;
use crate::core::eviction::{EvictionPlan, EvictionPlanner};
use crate::core::fleet::FleetView;
use crate::core::history::HistoryRecorder;
use crate::core::overload::{over_utilized_hosts, OverloadPredicate};
use crate::core::placement::PlacementSearch;
use crate::core::vm_selection::VmSelectionPolicy;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// The consolidation controller.
///
/// One `optimize` call plans a set of migrations relieving overloaded hosts
/// and draining under-utilized ones. Planning mutates the live fleet model as
/// a working copy; the allocation present at the start of the pass is
/// restored before the call returns, so the produced migration map is a plan,
/// not a commit.
pub struct Consolidator {
    fleet: FleetView,
    weight_mips: f64,
    weight_iops: f64,
    cpu_overload: Box<dyn OverloadPredicate>,
    io_overload: Box<dyn OverloadPredicate>,
    cpu_selection: Box<dyn VmSelectionPolicy>,
    io_selection: Box<dyn VmSelectionPolicy>,
    saved_allocation: Vec<(u32, VmRef)>,
    history: HistoryRecorder,
}

impl Consolidator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fleet: FleetView,
        cpu_overload: Box<dyn OverloadPredicate>,
        io_overload: Box<dyn OverloadPredicate>,
        cpu_selection: Box<dyn VmSelectionPolicy>,
        io_selection: Box<dyn VmSelectionPolicy>,
        weight_mips: f64,
        weight_iops: f64,
    ) -> Result<Self, ConsolidationError> {
        if (weight_mips + weight_iops - 1.).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConsolidationError::InvalidWeights {
                w_mips: weight_mips,
                w_iops: weight_iops,
            });
        }
        Ok(Self {
            fleet,
            weight_mips,
            weight_iops,
            cpu_overload,
            io_overload,
            cpu_selection,
            io_selection,
            saved_allocation: Vec::new(),
            history: HistoryRecorder::new(),
        })
    }

    pub fn fleet(&self) -> &FleetView {
        &self.fleet
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub fn weight_mips(&self) -> f64 {
        self.weight_mips
    }

    pub fn weight_iops(&self) -> f64 {
        self.weight_iops
    }

    /// Runs one consolidation pass at simulation clock `time` and returns the
    /// migration plan. The live fleet is left exactly as it was found.
    pub fn optimize(&mut self, time: f64) -> Result<MigrationMap, ConsolidationError> {
        let total_timer = Instant::now();

        let timer = Instant::now();
        let cpu_overloaded = self.detect_over_utilized(time, Dimension::Cpu);
        self.history.record_host_selection(timer.elapsed().as_secs_f64());
        debug!("over-utilized hosts (cpu): {:?}", host_ids(&cpu_overloaded));

        let timer = Instant::now();
        let io_overloaded = self.detect_over_utilized(time, Dimension::Io);
        self.history.record_host_selection_io(timer.elapsed().as_secs_f64());
        debug!("over-utilized hosts (io): {:?}", host_ids(&io_overloaded));

        // Pass-entry snapshot: placements never target a host that was
        // switched off when the pass started.
        let switched_off = self.fleet.switched_off_hosts();

        self.save_allocation();

        let timer = Instant::now();
        let eviction = EvictionPlanner::new(
            self.cpu_selection.as_ref(),
            self.io_selection.as_ref(),
            self.cpu_overload.as_ref(),
            self.io_overload.as_ref(),
            self.weight_mips,
            self.weight_iops,
        )
        .plan(&cpu_overloaded, &io_overloaded);
        self.history.record_vm_selection(timer.elapsed().as_secs_f64());

        let timer = Instant::now();
        let mut migration_map =
            self.place_overload_victims(eviction, &cpu_overloaded, &io_overloaded, &switched_off);
        self.history.record_vm_reallocation(timer.elapsed().as_secs_f64());

        let mut overloaded = cpu_overloaded;
        overloaded.extend(io_overloaded);
        migration_map.extend(self.drain_under_utilized_hosts(&overloaded, &switched_off));

        self.restore_allocation()?;

        self.history.record_total(total_timer.elapsed().as_secs_f64());
        Ok(migration_map)
    }

    /// Filters the fleet by the dimension's overload predicate, recording a
    /// history entry per host along the way.
    fn detect_over_utilized(&mut self, time: f64, dimension: Dimension) -> Vec<HostRef> {
        let predicate = match dimension {
            Dimension::Cpu => self.cpu_overload.as_ref(),
            Dimension::Io => self.io_overload.as_ref(),
        };
        for host in self.fleet.hosts() {
            let host = host.borrow();
            self.history
                .add_host_entry(host.id(), time, host.cpu_utilization(), predicate.metric(&host));
        }
        over_utilized_hosts(&self.fleet, predicate)
    }

    /// Snapshots the current (host, vm) pairs, excluding VMs that are still
    /// arriving over a live migration.
    fn save_allocation(&mut self) {
        self.saved_allocation.clear();
        for host in self.fleet.hosts() {
            let host = host.borrow();
            for vm in host.vms() {
                if host.is_migrating_in(vm.borrow().id()) {
                    continue;
                }
                self.saved_allocation.push((host.id(), vm.clone()));
            }
        }
    }

    /// Rebuilds the snapshotted allocation on the live fleet. The snapshot is
    /// a known-good state; failing to reproduce it is fatal.
    fn restore_allocation(&mut self) -> Result<(), ConsolidationError> {
        for host in self.fleet.hosts() {
            let mut host = host.borrow_mut();
            host.vm_destroy_all();
            host.reallocate_migrating_in_vms();
        }
        for (host_id, vm) in &self.saved_allocation {
            let vm_id = vm.borrow().id();
            let restored = self
                .fleet
                .host(*host_id)
                .is_some_and(|host| host.borrow_mut().vm_create(vm.clone()));
            if !restored {
                return Err(ConsolidationError::RestoreFailed {
                    vm_id,
                    host_id: *host_id,
                });
            }
        }
        Ok(())
    }

    /// Places the eviction victims, heavier-weighted dimension first, each
    /// list ordered by the VM demand on its dimension, descending. A VM with
    /// no qualifying target is skipped and simply stays off the plan.
    fn place_overload_victims(
        &self,
        eviction: EvictionPlan,
        cpu_overloaded: &[HostRef],
        io_overloaded: &[HostRef],
        switched_off: &[HostRef],
    ) -> MigrationMap {
        let EvictionPlan {
            mut cpu_victims,
            mut io_victims,
        } = eviction;
        cpu_victims.sort_by(|a, b| b.borrow().cpu_mips().total_cmp(&a.borrow().cpu_mips()));
        io_victims.sort_by(|a, b| b.borrow().io_iops().total_cmp(&a.borrow().io_iops()));

        let mut excluded: HashSet<u32> = HashSet::new();
        excluded.extend(host_ids(cpu_overloaded));
        excluded.extend(host_ids(io_overloaded));
        excluded.extend(host_ids(switched_off));

        let ordered = if self.weight_mips > self.weight_iops {
            [cpu_victims, io_victims]
        } else {
            [io_victims, cpu_victims]
        };

        let search = PlacementSearch::new(&self.fleet, self.cpu_overload.as_ref(), self.io_overload.as_ref());
        let mut migration_map = MigrationMap::new();
        for victims in ordered {
            for vm in victims {
                let vm_id = vm.borrow().id();
                match search.find_host_for_vm(&vm, &excluded) {
                    Some(host) if host.borrow_mut().vm_create(vm.clone()) => {
                        let host_id = host.borrow().id();
                        debug!("vm #{} allocated to host #{}", vm_id, host_id);
                        migration_map.push(Placement { vm_id, host_id });
                    }
                    _ => {
                        // The VM stays stranded on its relieved origin until
                        // the simulator drives the controller again.
                        trace!("no placement found for vm #{}", vm_id);
                    }
                }
            }
        }
        migration_map
    }

    /// Drains under-utilized hosts one at a time, all-or-nothing per host: a
    /// host contributes to the plan only if every one of its eligible VMs has
    /// a target.
    fn drain_under_utilized_hosts(&self, overloaded: &[HostRef], switched_off: &[HostRef]) -> MigrationMap {
        // over-utilized hosts + hosts already chosen as drain sources or targets
        let mut exclude_under_search: HashSet<u32> = HashSet::new();
        exclude_under_search.extend(host_ids(overloaded));
        exclude_under_search.extend(host_ids(switched_off));
        // over-utilized + under-utilized hosts
        let mut exclude_new_placement = exclude_under_search.clone();

        let search = PlacementSearch::new(&self.fleet, self.cpu_overload.as_ref(), self.io_overload.as_ref());
        let mut migration_map = MigrationMap::new();

        loop {
            if exclude_under_search.len() == self.fleet.host_count() {
                break;
            }
            let Some(under_utilized) = self.under_utilized_host(&exclude_under_search) else {
                break;
            };
            let under_id = under_utilized.borrow().id();
            debug!("under-utilized host: #{}", under_id);
            exclude_under_search.insert(under_id);
            exclude_new_placement.insert(under_id);

            let mut victims: Vec<VmRef> = under_utilized
                .borrow()
                .vms()
                .filter(|vm| !vm.borrow().is_in_migration())
                .cloned()
                .collect();
            if victims.is_empty() {
                continue;
            }
            if self.weight_mips > self.weight_iops {
                victims.sort_by(|a, b| b.borrow().cpu_mips().total_cmp(&a.borrow().cpu_mips()));
            } else {
                victims.sort_by(|a, b| b.borrow().io_iops().total_cmp(&a.borrow().io_iops()));
            }

            let mut local_plan: Vec<(VmRef, HostRef)> = Vec::new();
            let mut complete = true;
            for vm in &victims {
                let mut placed = false;
                if let Some(host) = search.find_host_for_vm(vm, &exclude_new_placement) {
                    if host.borrow_mut().vm_create(vm.clone()) {
                        local_plan.push((vm.clone(), host));
                        placed = true;
                    }
                }
                if !placed {
                    debug!(
                        "not all vms can be reallocated from host #{}, reallocation cancelled",
                        under_id
                    );
                    for (vm, host) in &local_plan {
                        host.borrow_mut().vm_destroy(vm.borrow().id());
                    }
                    local_plan.clear();
                    complete = false;
                    break;
                }
            }
            if complete {
                for (vm, host) in &local_plan {
                    let host_id = host.borrow().id();
                    exclude_under_search.insert(host_id);
                    migration_map.push(Placement {
                        vm_id: vm.borrow().id(),
                        host_id,
                    });
                }
            }
        }
        migration_map
    }

    /// Returns the host with the smallest strictly-positive utilization on
    /// the weight-selected dimension that is not excluded and not in a
    /// migration transition. Zero utilization means switch-off candidate, not
    /// drain candidate.
    fn under_utilized_host(&self, excluded: &HashSet<u32>) -> Option<HostRef> {
        let use_cpu = self.weight_mips > self.weight_iops;
        let mut min_utilization = 1.;
        let mut result = None;
        for host_ref in self.fleet.hosts() {
            let host = host_ref.borrow();
            if excluded.contains(&host.id()) {
                continue;
            }
            let utilization = if use_cpu {
                host.cpu_utilization()
            } else {
                host.io_utilization()
            };
            if utilization > 0. && utilization < min_utilization && !host.is_in_migration_transition() {
                min_utilization = utilization;
                result = Some(host_ref.clone());
            }
        }
        result
    }
}

fn host_ids(hosts: &[HostRef]) -> Vec<u32> {
    hosts.iter().map(|host| host.borrow().id()).collect()
}
