//! Physical host model.

use std::collections::BTreeMap;

use greendc_power_models::host::HostPowerModel;

use crate::core::common::{AllocationVerdict, VmRef};
use crate::core::vm::VirtualMachine;

/// A physical host: resource capacities, power model and the VMs currently
/// placed on it.
///
/// Residents are kept in a map ordered by VM id so that iteration over them
/// is deterministic. VMs being live-migrated onto the host are resident (they
/// already occupy resources) and additionally tracked in a migrating-in map.
pub struct Host {
    id: u32,
    cpu_total_mips: f64,
    io_total_iops: f64,
    memory_total: u64,
    power_model: HostPowerModel,
    vms: BTreeMap<u32, VmRef>,
    vms_migrating_in: BTreeMap<u32, VmRef>,
    cpu_utilization_history: Vec<f64>,
}

impl Host {
    pub fn new(
        id: u32,
        cpu_total_mips: f64,
        io_total_iops: f64,
        memory_total: u64,
        power_model: HostPowerModel,
    ) -> Self {
        Self {
            id,
            cpu_total_mips,
            io_total_iops,
            memory_total,
            power_model,
            vms: BTreeMap::new(),
            vms_migrating_in: BTreeMap::new(),
            cpu_utilization_history: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn cpu_total_mips(&self) -> f64 {
        self.cpu_total_mips
    }

    pub fn io_total_iops(&self) -> f64 {
        self.io_total_iops
    }

    pub fn memory_total(&self) -> u64 {
        self.memory_total
    }

    /// Resident VMs in id order.
    pub fn vms(&self) -> impl Iterator<Item = &VmRef> + '_ {
        self.vms.values()
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.vms.contains_key(&vm_id)
    }

    pub fn is_migrating_in(&self, vm_id: u32) -> bool {
        self.vms_migrating_in.contains_key(&vm_id)
    }

    /// Checks whether the VM fits on this host on all capacity axes.
    pub fn can_allocate(&self, vm: &VirtualMachine) -> AllocationVerdict {
        if self.cpu_available_mips() < vm.cpu_mips() {
            return AllocationVerdict::NotEnoughCpu;
        }
        if self.io_available_iops() < vm.io_iops() {
            return AllocationVerdict::NotEnoughIo;
        }
        if self.memory_available() < vm.memory() {
            return AllocationVerdict::NotEnoughMemory;
        }
        AllocationVerdict::Success
    }

    pub fn is_suitable_for_vm(&self, vm: &VirtualMachine) -> bool {
        self.can_allocate(vm) == AllocationVerdict::Success
    }

    /// Places the VM on this host if it fits. Returns whether it was placed.
    pub fn vm_create(&mut self, vm: VmRef) -> bool {
        let (id, suitable) = {
            let vm = vm.borrow();
            (vm.id(), self.is_suitable_for_vm(&vm))
        };
        if !suitable {
            return false;
        }
        self.vms.insert(id, vm);
        true
    }

    /// Removes the VM from this host, returning its handle.
    pub fn vm_destroy(&mut self, vm_id: u32) -> Option<VmRef> {
        self.vms.remove(&vm_id)
    }

    /// Removes all resident VMs, including migrating-in ones.
    pub fn vm_destroy_all(&mut self) {
        self.vms.clear();
    }

    /// Registers a VM that is being live-migrated onto this host. The VM
    /// occupies resources for the whole duration of the migration.
    pub fn add_migrating_in_vm(&mut self, vm: VmRef) {
        let id = vm.borrow().id();
        self.vms_migrating_in.insert(id, vm.clone());
        self.vms.entry(id).or_insert(vm);
    }

    /// Completes a live migration: the VM stays resident as a regular one.
    pub fn remove_migrating_in_vm(&mut self, vm_id: u32) {
        self.vms_migrating_in.remove(&vm_id);
    }

    /// Re-creates the resident entries of migrating-in VMs after `vm_destroy_all`.
    pub fn reallocate_migrating_in_vms(&mut self) {
        for (id, vm) in &self.vms_migrating_in {
            self.vms.entry(*id).or_insert_with(|| vm.clone());
        }
    }

    /// MIPS allocated to the VM on this host, 0 if the VM is not resident.
    pub fn allocated_mips_for_vm(&self, vm_id: u32) -> f64 {
        self.vms.get(&vm_id).map_or(0., |vm| vm.borrow().cpu_mips())
    }

    /// IOPS allocated to the VM on this host, 0 if the VM is not resident.
    pub fn allocated_iops_for_vm(&self, vm_id: u32) -> f64 {
        self.vms.get(&vm_id).map_or(0., |vm| vm.borrow().io_iops())
    }

    fn allocated_mips(&self) -> f64 {
        self.vms.values().map(|vm| vm.borrow().cpu_mips()).sum()
    }

    fn allocated_iops(&self) -> f64 {
        self.vms.values().map(|vm| vm.borrow().io_iops()).sum()
    }

    fn allocated_memory(&self) -> u64 {
        self.vms.values().map(|vm| vm.borrow().memory()).sum()
    }

    pub fn cpu_available_mips(&self) -> f64 {
        self.cpu_total_mips - self.allocated_mips()
    }

    pub fn io_available_iops(&self) -> f64 {
        self.io_total_iops - self.allocated_iops()
    }

    pub fn memory_available(&self) -> u64 {
        self.memory_total - self.allocated_memory()
    }

    /// CPU utilization as a fraction of total capacity.
    pub fn cpu_utilization(&self) -> f64 {
        self.allocated_mips() / self.cpu_total_mips
    }

    /// IO utilization as a fraction of total capacity.
    pub fn io_utilization(&self) -> f64 {
        self.allocated_iops() / self.io_total_iops
    }

    pub fn power_model(&self) -> &HostPowerModel {
        &self.power_model
    }

    /// Current power draw in Watts.
    pub fn current_power(&self) -> f64 {
        self.power_model.get_power(self.cpu_utilization())
    }

    /// True when the host should not be drained: it is empty, every resident
    /// VM is already migrating away, or some VM is still arriving.
    pub fn is_in_migration_transition(&self) -> bool {
        for vm in self.vms.values() {
            let vm = vm.borrow();
            if !vm.is_in_migration() {
                return false;
            }
            if self.vms_migrating_in.contains_key(&vm.id()) {
                return true;
            }
        }
        true
    }

    /// Observed CPU utilization samples, appended by the surrounding
    /// simulation at its scheduling instants.
    pub fn cpu_utilization_history(&self) -> &[f64] {
        &self.cpu_utilization_history
    }

    pub fn add_utilization_sample(&mut self, utilization: f64) {
        self.cpu_utilization_history.push(utilization);
    }
}
