//! Common data structures.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::core::host::Host;
use crate::core::vm::VirtualMachine;

/// Shared handle to a host of the fleet.
pub type HostRef = Rc<RefCell<Host>>;

/// Shared handle to a virtual machine.
pub type VmRef = Rc<RefCell<VirtualMachine>>;

/// The two resource dimensions the planner consolidates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Cpu,
    Io,
}

/// A planned relocation of a VM to a new host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub vm_id: u32,
    pub host_id: u32,
}

/// Ordered sequence of placements produced by one consolidation pass.
pub type MigrationMap = Vec<Placement>;

/// Describes a result of checking whether a VM fits on a host.
#[derive(Debug, PartialEq, Eq)]
pub enum AllocationVerdict {
    NotEnoughCpu,
    NotEnoughIo,
    NotEnoughMemory,
    Success,
}
