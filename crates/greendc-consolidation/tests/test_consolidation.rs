use std::cell::RefCell;
use std::rc::Rc;

use greendc_consolidation::core::common::{HostRef, Placement, VmRef};
use greendc_consolidation::core::consolidator::Consolidator;
use greendc_consolidation::core::error::ConsolidationError;
use greendc_consolidation::core::fleet::FleetView;
use greendc_consolidation::core::host::Host;
use greendc_consolidation::core::overload::{StaticCpuThreshold, StaticIoThreshold};
use greendc_consolidation::core::vm::VirtualMachine;
use greendc_consolidation::core::vm_selection::{MinimumMigrationTime, WeightedMaximumUtilization};
use greendc_power_models::cpu_models::linear::LinearPowerModel;
use greendc_power_models::host::HostPowerModel;

fn host(id: u32, cpu_mips: f64, io_iops: f64) -> HostRef {
    let power_model = HostPowerModel::new(Box::new(LinearPowerModel::new(100., 250.)), 0., true);
    Rc::new(RefCell::new(Host::new(id, cpu_mips, io_iops, 65536, power_model)))
}

fn vm(id: u32, cpu_mips: f64, io_iops: f64, memory: u64) -> VmRef {
    Rc::new(RefCell::new(VirtualMachine::new(id, cpu_mips, io_iops, memory)))
}

fn place(host: &HostRef, vm: &VmRef) {
    assert!(host.borrow_mut().vm_create(vm.clone()));
}

fn vm_ids(host: &HostRef) -> Vec<u32> {
    host.borrow().vms().map(|vm| vm.borrow().id()).collect()
}

fn consolidator(hosts: Vec<HostRef>, weight_mips: f64, weight_iops: f64) -> Consolidator {
    Consolidator::new(
        FleetView::new(hosts),
        Box::new(StaticCpuThreshold::new(0.8)),
        Box::new(StaticIoThreshold::new(0.8)),
        Box::new(MinimumMigrationTime),
        Box::new(WeightedMaximumUtilization::new(weight_mips, weight_iops)),
        weight_mips,
        weight_iops,
    )
    .unwrap()
}

#[test]
// An idle fleet produces an empty plan and stays untouched; every host still
// gets one history entry per pass.
fn test_idle_fleet() {
    let hosts = vec![host(1, 1000., 1000.), host(2, 1000., 1000.), host(3, 1000., 1000.)];
    let mut consolidator = consolidator(hosts.clone(), 0.7, 0.3);

    let migration_map = consolidator.optimize(1.0).unwrap();

    assert!(migration_map.is_empty());
    for h in &hosts {
        assert_eq!(h.borrow().vm_count(), 0);
    }
    for id in 1..=3 {
        assert_eq!(consolidator.history().time_history()[&id], vec![1.0]);
    }
}

#[test]
// A CPU-overloaded host gets relieved onto the lightly loaded host; the
// switched-off host is never a target. The fleet is unchanged afterwards.
fn test_single_cpu_overload() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 1000., 1000.);
    let h3 = host(3, 1000., 1000.);
    let a = vm(1, 500., 100., 1024);
    let b = vm(2, 400., 100., 2048);
    let c = vm(3, 100., 100., 1024);
    place(&h1, &a);
    place(&h1, &b);
    place(&h2, &c);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone(), h3.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    // minimum-migration-time picks A (smallest memory), one eviction relieves H1
    assert_eq!(migration_map, vec![Placement { vm_id: 1, host_id: 2 }]);
    assert_eq!(vm_ids(&h1), vec![1, 2]);
    assert_eq!(vm_ids(&h2), vec![3]);
    assert_eq!(vm_ids(&h3), Vec::<u32>::new());
}

#[test]
// A host overloaded on both dimensions is relieved CPU-first under
// wMips > wIops; IO eviction runs only because CPU eviction alone leaves the
// host IO-overloaded. CPU victims are placed before IO victims.
fn test_dual_overload_common_host() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 10000., 10000.);
    let d = vm(1, 500., 100., 1000);
    let e = vm(2, 400., 450., 2000);
    let f = vm(3, 50., 450., 3000);
    let g = vm(4, 100., 100., 1000);
    place(&h1, &d);
    place(&h1, &e);
    place(&h1, &f);
    place(&h2, &g);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    // CPU pass evicts D (relieves CPU: 0.95 -> 0.45), IO stays at 0.9, so the
    // IO pass evicts E (the heaviest weighted VM left).
    assert_eq!(
        migration_map,
        vec![
            Placement { vm_id: 1, host_id: 2 },
            Placement { vm_id: 2, host_id: 2 },
        ]
    );
    assert_eq!(vm_ids(&h1), vec![1, 2, 3]);
    assert_eq!(vm_ids(&h2), vec![4]);
}

#[test]
// When the CPU eviction also relieves the IO overload of a common host, the
// IO pass has nothing to do.
fn test_dual_overload_relieved_by_cpu_pass() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 10000., 10000.);
    let d = vm(1, 500., 500., 1000);
    let e = vm(2, 400., 400., 2000);
    let g = vm(3, 100., 100., 1000);
    place(&h1, &d);
    place(&h1, &e);
    place(&h2, &g);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    assert_eq!(migration_map, vec![Placement { vm_id: 1, host_id: 2 }]);
}

#[test]
// An under-utilized host is fully drained when every VM has a target, in
// CPU-demand-descending order under wMips > wIops.
fn test_under_utilized_drain_success() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 1000., 1000.);
    let x = vm(1, 50., 10., 512);
    let y = vm(2, 40., 10., 512);
    let z = vm(3, 30., 10., 512);
    let w = vm(4, 200., 100., 512);
    place(&h1, &x);
    place(&h1, &y);
    place(&h1, &z);
    place(&h2, &w);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    assert_eq!(
        migration_map,
        vec![
            Placement { vm_id: 1, host_id: 2 },
            Placement { vm_id: 2, host_id: 2 },
            Placement { vm_id: 3, host_id: 2 },
        ]
    );
    assert_eq!(vm_ids(&h1), vec![1, 2, 3]);
    assert_eq!(vm_ids(&h2), vec![4]);
}

#[test]
// Draining is all-or-nothing per host: if one VM has no target, the partial
// placements are rolled back and the host contributes nothing to the plan.
fn test_under_utilized_drain_abort() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 200., 1000.);
    let x = vm(1, 50., 10., 512);
    let y = vm(2, 40., 10., 512);
    let z = vm(3, 30., 10., 512);
    let w = vm(4, 100., 10., 512);
    place(&h1, &x);
    place(&h1, &y);
    place(&h1, &z);
    place(&h2, &w);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    // X fits on H2, but placing Y would push H2 over the CPU threshold
    assert!(migration_map.is_empty());
    assert_eq!(vm_ids(&h1), vec![1, 2, 3]);
    assert_eq!(vm_ids(&h2), vec![4]);
}

#[test]
// Among hosts with an equal power increment the one earliest in fleet
// iteration order wins.
fn test_power_tie_break() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 2000., 2000.);
    let h3 = host(3, 2000., 2000.);
    let a = vm(1, 900., 100., 512);
    let t2 = vm(4, 100., 100., 512);
    let t3 = vm(5, 100., 100., 512);
    place(&h1, &a);
    place(&h2, &t2);
    place(&h3, &t3);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone(), h3.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    // H2 and H3 are identical, so the power deltas for A tie; afterwards the
    // drain empties H3 (the least loaded host) onto H2.
    assert_eq!(
        migration_map,
        vec![
            Placement { vm_id: 1, host_id: 2 },
            Placement { vm_id: 5, host_id: 2 },
        ]
    );
}

#[test]
// Under wIops > wMips the under-utilization search runs on the IO dimension:
// H1 has the smallest positive IO utilization and is drained first even
// though its CPU utilization is the highest.
fn test_under_utilization_dimension_follows_weights() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 1000., 1000.);
    let h3 = host(3, 1000., 1000.);
    let v1 = vm(1, 500., 50., 512);
    let v2 = vm(2, 50., 500., 512);
    let v3 = vm(3, 100., 100., 512);
    place(&h1, &v1);
    place(&h2, &v2);
    place(&h3, &v3);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone(), h3.clone()], 0.3, 0.7);
    let migration_map = consolidator.optimize(1.0).unwrap();

    // a CPU-dimension search would have drained H2 (vm 2) first instead
    assert_eq!(migration_map[0].vm_id, 1);
}

#[test]
// A still-overloaded host whose VMs are all migrating yields no victims and
// the pass degrades to an empty plan.
fn test_overloaded_host_with_all_vms_migrating() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 1000., 1000.);
    let a = vm(1, 500., 100., 512);
    let b = vm(2, 400., 100., 512);
    a.borrow_mut().set_in_migration(true);
    b.borrow_mut().set_in_migration(true);
    place(&h1, &a);
    place(&h1, &b);

    let mut consolidator = consolidator(vec![h1.clone(), h2.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    assert!(migration_map.is_empty());
    assert_eq!(vm_ids(&h1), vec![1, 2]);
}

#[test]
// Migrating-in VMs are excluded from the snapshot but survive the pass: the
// restore path re-creates them from the migrating-in set.
fn test_restore_keeps_migrating_in_vms() {
    let h1 = host(1, 1000., 1000.);
    let n = vm(1, 300., 100., 512);
    let m = vm(2, 100., 50., 512);
    m.borrow_mut().set_in_migration(true);
    place(&h1, &n);
    h1.borrow_mut().add_migrating_in_vm(m.clone());

    let mut consolidator = consolidator(vec![h1.clone()], 0.7, 0.3);
    let migration_map = consolidator.optimize(1.0).unwrap();

    assert!(migration_map.is_empty());
    assert_eq!(vm_ids(&h1), vec![1, 2]);
    assert!(h1.borrow().is_migrating_in(2));
}

#[test]
// Weights that do not sum to 1 are rejected at construction.
fn test_invalid_weights_rejected() {
    let result = Consolidator::new(
        FleetView::new(vec![host(1, 1000., 1000.)]),
        Box::new(StaticCpuThreshold::new(0.8)),
        Box::new(StaticIoThreshold::new(0.8)),
        Box::new(MinimumMigrationTime),
        Box::new(WeightedMaximumUtilization::new(0.7, 0.4)),
        0.7,
        0.4,
    );

    assert_eq!(
        result.err(),
        Some(ConsolidationError::InvalidWeights {
            w_mips: 0.7,
            w_iops: 0.4
        })
    );
}

#[test]
// The three per-host history sequences stay parallel and the time history is
// strictly increasing across passes; the per-pass timers gain one entry each.
fn test_history_parity_and_monotonicity() {
    let h1 = host(1, 1000., 1000.);
    let h2 = host(2, 1000., 1000.);
    let v = vm(1, 300., 100., 512);
    place(&h1, &v);

    let mut consolidator = consolidator(vec![h1, h2], 0.7, 0.3);
    consolidator.optimize(1.0).unwrap();
    consolidator.optimize(2.5).unwrap();

    let history = consolidator.history();
    for id in 1..=2 {
        let times = &history.time_history()[&id];
        assert_eq!(times, &vec![1.0, 2.5]);
        assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(history.utilization_history()[&id].len(), times.len());
        assert_eq!(history.metric_history()[&id].len(), times.len());
    }
    assert_eq!(history.host_selection_time().len(), 2);
    assert_eq!(history.host_selection_io_time().len(), 2);
    assert_eq!(history.vm_selection_time().len(), 2);
    assert_eq!(history.vm_reallocation_time().len(), 2);
    assert_eq!(history.total_time().len(), 2);
}
