//! Per-host utilization traces and per-pass timing traces.

use std::collections::BTreeMap;
use std::fs::File;

use serde::Serialize;

/// One exported row of the per-host traces.
#[derive(Serialize)]
struct HistoryRow {
    host_id: u32,
    time: f64,
    cpu_utilization: f64,
    metric: f64,
}

/// Records what each consolidation pass observed and how long its phases took.
///
/// The three per-host sequences are parallel: one entry per simulation clock
/// value at which the host was examined by a detector.
#[derive(Default)]
pub struct HistoryRecorder {
    time_history: BTreeMap<u32, Vec<f64>>,
    utilization_history: BTreeMap<u32, Vec<f64>>,
    metric_history: BTreeMap<u32, Vec<f64>>,
    host_selection_time: Vec<f64>,
    host_selection_io_time: Vec<f64>,
    vm_selection_time: Vec<f64>,
    vm_reallocation_time: Vec<f64>,
    total_time: Vec<f64>,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a host observation at clock `time`. Idempotent per clock value:
    /// repeated detector queries within one pass record nothing new.
    pub fn add_host_entry(&mut self, host_id: u32, time: f64, cpu_utilization: f64, metric: f64) {
        let times = self.time_history.entry(host_id).or_default();
        if times.contains(&time) {
            return;
        }
        times.push(time);
        self.utilization_history.entry(host_id).or_default().push(cpu_utilization);
        self.metric_history.entry(host_id).or_default().push(metric);
    }

    pub fn time_history(&self) -> &BTreeMap<u32, Vec<f64>> {
        &self.time_history
    }

    pub fn utilization_history(&self) -> &BTreeMap<u32, Vec<f64>> {
        &self.utilization_history
    }

    pub fn metric_history(&self) -> &BTreeMap<u32, Vec<f64>> {
        &self.metric_history
    }

    pub(crate) fn record_host_selection(&mut self, seconds: f64) {
        self.host_selection_time.push(seconds);
    }

    pub(crate) fn record_host_selection_io(&mut self, seconds: f64) {
        self.host_selection_io_time.push(seconds);
    }

    pub(crate) fn record_vm_selection(&mut self, seconds: f64) {
        self.vm_selection_time.push(seconds);
    }

    pub(crate) fn record_vm_reallocation(&mut self, seconds: f64) {
        self.vm_reallocation_time.push(seconds);
    }

    pub(crate) fn record_total(&mut self, seconds: f64) {
        self.total_time.push(seconds);
    }

    /// Wall time of the CPU host-selection phase of each pass, seconds.
    pub fn host_selection_time(&self) -> &[f64] {
        &self.host_selection_time
    }

    /// Wall time of the IO host-selection phase of each pass, seconds.
    pub fn host_selection_io_time(&self) -> &[f64] {
        &self.host_selection_io_time
    }

    /// Wall time of the VM-selection phase of each pass, seconds.
    pub fn vm_selection_time(&self) -> &[f64] {
        &self.vm_selection_time
    }

    /// Wall time of the VM-reallocation phase of each pass, seconds.
    pub fn vm_reallocation_time(&self) -> &[f64] {
        &self.vm_reallocation_time
    }

    /// Total wall time of each pass, seconds.
    pub fn total_time(&self) -> &[f64] {
        &self.total_time
    }

    /// Saves the per-host traces as csv rows.
    pub fn save_csv(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for (host_id, times) in &self.time_history {
            for (i, time) in times.iter().enumerate() {
                wtr.serialize(HistoryRow {
                    host_id: *host_id,
                    time: *time,
                    cpu_utilization: self.utilization_history[host_id][i],
                    metric: self.metric_history[host_id][i],
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}
